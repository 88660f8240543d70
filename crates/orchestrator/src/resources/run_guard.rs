//! Per-session run lock.
//!
//! At most one run may be active for a session. The lock is held by a
//! [`RunGuard`] for the lifetime of the run and released on drop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

/// Registry of sessions with an active run.
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session for a run, or fail with `SessionBusy`.
    pub fn try_acquire(&self, session_id: &str, run_id: Uuid) -> Result<RunGuard> {
        if !self.lock().insert(session_id.to_string()) {
            return Err(OrchestratorError::SessionBusy(session_id.to_string()));
        }

        debug!(session_id = %session_id, run_id = %run_id, "Session lock acquired");
        Ok(RunGuard {
            session_id: session_id.to_string(),
            run_id,
            locks: self.clone(),
            completed: false,
        })
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.lock().contains(session_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, session_id: &str) {
        self.lock().remove(session_id);
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds a session's run lock until dropped.
///
/// Dropping the guard without `mark_completed` logs a warning, which
/// happens when the run task is aborted or panics.
#[derive(Debug)]
pub struct RunGuard {
    session_id: String,
    run_id: Uuid,
    locks: SessionLocks,
    completed: bool,
}

impl RunGuard {
    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.completed {
            warn!(
                session_id = %self.session_id,
                run_id = %self.run_id,
                "Run guard dropped without completion"
            );
        }
        self.locks.release(&self.session_id);
        debug!(session_id = %self.session_id, run_id = %self.run_id, "Session lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let locks = SessionLocks::new();
        let mut guard = locks.try_acquire("s1", Uuid::new_v4()).unwrap();

        assert!(locks.is_active("s1"));
        assert!(matches!(
            locks.try_acquire("s1", Uuid::new_v4()),
            Err(OrchestratorError::SessionBusy(_))
        ));

        // Other sessions are unaffected
        let other = locks.try_acquire("s2", Uuid::new_v4()).unwrap();
        assert_eq!(locks.active_count(), 2);

        guard.mark_completed();
        drop(guard);
        drop(other);
        assert!(!locks.is_active("s1"));
        assert!(locks.try_acquire("s1", Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_guard_releases_without_completion() {
        let locks = SessionLocks::new();
        let run_id = Uuid::new_v4();
        let guard = locks.try_acquire("s1", run_id).unwrap();

        assert!(!guard.is_completed());
        assert_eq!(guard.session_id(), "s1");
        assert_eq!(guard.run_id(), run_id);

        drop(guard);
        assert_eq!(locks.active_count(), 0);
    }
}
