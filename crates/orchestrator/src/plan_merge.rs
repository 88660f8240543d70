//! Merging proposed task lists into a stored plan.
//!
//! Tasks are matched by key. New keys are appended after the highest
//! existing order. Status changes go through [`TaskStateMachine`], so
//! only the current task can finish and finished tasks stay as they are.
//! Tasks missing from the proposal are left untouched.

use std::collections::HashSet;

use taskflow_core::{CoreError, Plan, Task, TaskStatus};
use tracing::{debug, warn};

use crate::state_machine::TaskStateMachine;

/// Why a proposed status change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Only the first pending task may finish
    NotCurrentTask,
    /// Finished tasks never return to pending
    Rollback,
    /// Completed and failed never swap
    PolarityFlip,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotCurrentTask => "not_current_task",
            Self::Rollback => "rollback",
            Self::PolarityFlip => "polarity_flip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub key: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedUpdate {
    pub key: String,
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub reason: RejectReason,
}

/// Result of a merge: the new plan plus what happened to get there.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub plan: Plan,
    pub added: Vec<String>,
    pub status_changes: Vec<StatusChange>,
    pub content_updates: Vec<String>,
    pub rejected: Vec<RejectedUpdate>,
}

impl MergeOutcome {
    /// True when the merged plan equals the existing one.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.status_changes.is_empty() && self.content_updates.is_empty()
    }
}

/// Merge `proposed` tasks into `existing`.
pub fn merge_plan(existing: &Plan, proposed: &[Task]) -> MergeOutcome {
    let current_key = existing.first_pending().map(|t| t.key.clone());
    let mut tasks = existing.tasks().to_vec();
    let mut next_order = existing.max_order() + 1;
    let mut seen = HashSet::new();
    let mut outcome = MergeOutcome::default();

    for candidate in proposed {
        if !seen.insert(candidate.key.as_str()) {
            continue;
        }

        let Some(task) = tasks.iter_mut().find(|t| t.key == candidate.key) else {
            debug!(task_key = %candidate.key, order = next_order, "Appending new task");
            tasks.push(Task {
                key: candidate.key.clone(),
                description: candidate.description.clone(),
                status: candidate.status,
                order: next_order,
            });
            next_order += 1;
            outcome.added.push(candidate.key.clone());
            continue;
        };

        if candidate.status != task.status {
            let is_current = current_key.as_deref() == Some(task.key.as_str());
            if let Err(e) =
                TaskStateMachine::validate_transition(&task.status, &candidate.status, is_current)
            {
                let reason = reject_reason(task.status, candidate.status);
                warn!(
                    task_key = %task.key,
                    reason = reason.as_str(),
                    error = %e,
                    "Rejected proposed task update"
                );
                outcome.rejected.push(RejectedUpdate {
                    key: task.key.clone(),
                    from: task.status,
                    to: candidate.status,
                    reason,
                });
                continue;
            }

            outcome.status_changes.push(StatusChange {
                key: task.key.clone(),
                from: task.status,
                to: candidate.status,
            });
            task.status = candidate.status;
        }

        if candidate.description != task.description {
            task.description = candidate.description.clone();
            outcome.content_updates.push(task.key.clone());
        }
    }

    outcome.plan = Plan::new(tasks);
    outcome
}

fn reject_reason(from: TaskStatus, to: TaskStatus) -> RejectReason {
    match (from.is_finished(), to.is_finished()) {
        (true, false) => RejectReason::Rollback,
        (true, true) => RejectReason::PolarityFlip,
        _ => RejectReason::NotCurrentTask,
    }
}

/// Move a pending task to a finished status outside the merge rules.
///
/// Used for retry exhaustion and for malformed updater output. Returns
/// `Ok(false)` when the task is already finished.
pub fn force_status(
    plan: &mut Plan,
    key: &str,
    status: TaskStatus,
) -> std::result::Result<bool, CoreError> {
    if !status.is_finished() {
        return Err(CoreError::Validation(format!(
            "cannot force task {} back to {}",
            key, status
        )));
    }

    let task = plan
        .get_mut(key)
        .ok_or_else(|| CoreError::TaskNotFound(key.to_string()))?;
    if task.status.is_finished() {
        return Ok(false);
    }

    task.status = status;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan_parser::parse_tasks;

    fn plan(text: &str) -> Plan {
        Plan::new(parse_tasks(text))
    }

    fn statuses(plan: &Plan) -> Vec<(&str, TaskStatus)> {
        plan.tasks()
            .iter()
            .map(|t| (t.key.as_str(), t.status))
            .collect()
    }

    #[test]
    fn test_current_task_completes() {
        let existing = plan("- [ ] 1. Search\n- [ ] 2. Reply");
        let outcome = merge_plan(&existing, &parse_tasks("- [x] 1. Search\n- [ ] 2. Reply"));

        assert_eq!(
            statuses(&outcome.plan),
            vec![("1", TaskStatus::Completed), ("2", TaskStatus::Pending)]
        );
        assert_eq!(outcome.status_changes.len(), 1);
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.plan.first_pending().unwrap().key, "2");
    }

    #[test]
    fn test_future_task_cannot_complete() {
        let existing = plan("- [ ] 1. Search\n- [ ] 2. Reply");
        let outcome = merge_plan(&existing, &parse_tasks("- [ ] 1. Search\n- [x] 2. Reply"));

        assert_eq!(
            statuses(&outcome.plan),
            vec![("1", TaskStatus::Pending), ("2", TaskStatus::Pending)]
        );
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].reason, RejectReason::NotCurrentTask);
    }

    #[test]
    fn test_no_rollback() {
        let existing = plan("- [x] 1. Search\n- [!] 2. Call\n- [ ] 3. Reply");
        let outcome = merge_plan(
            &existing,
            &parse_tasks("- [ ] 1. Search\n- [ ] 2. Call\n- [ ] 3. Reply"),
        );

        assert_eq!(
            statuses(&outcome.plan),
            vec![
                ("1", TaskStatus::Completed),
                ("2", TaskStatus::Failed),
                ("3", TaskStatus::Pending)
            ]
        );
        assert!(outcome
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::Rollback));
        assert!(outcome.is_noop());
    }

    #[test]
    fn test_no_polarity_flip() {
        let existing = plan("- [x] 1. Search\n- [!] 2. Call");
        let outcome = merge_plan(&existing, &parse_tasks("- [!] 1. Search\n- [x] 2. Call"));

        assert_eq!(
            statuses(&outcome.plan),
            vec![("1", TaskStatus::Completed), ("2", TaskStatus::Failed)]
        );
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.rejected[0].reason, RejectReason::PolarityFlip);
    }

    #[test]
    fn test_content_update_keeps_status() {
        let existing = plan("- [x] 1. Search\n- [ ] 2. Reply");
        let outcome = merge_plan(
            &existing,
            &parse_tasks("- [x] 1. Search (found 3 tickets)\n- [ ] 2. Reply to all three"),
        );

        let tasks = outcome.plan.tasks();
        assert_eq!(tasks[0].description, "1. Search (found 3 tickets)");
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert_eq!(tasks[1].description, "2. Reply to all three");
        assert_eq!(outcome.content_updates, vec!["1", "2"]);
    }

    #[test]
    fn test_rejected_update_keeps_text() {
        let existing = plan("- [x] 1. Search");
        let outcome = merge_plan(&existing, &parse_tasks("- [ ] 1. Search again"));

        assert_eq!(outcome.plan.tasks()[0].description, "1. Search");
        assert!(outcome.content_updates.is_empty());
    }

    #[test]
    fn test_new_tasks_appended_in_order() {
        let existing = plan("- [x] 1. Search\n- [ ] 2. Reply");
        let outcome = merge_plan(
            &existing,
            &parse_tasks("- [ ] 4. Follow up\n- [ ] 1. Search\n- [ ] 3. Escalate"),
        );

        let keys: Vec<_> = outcome.plan.tasks().iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["1", "2", "4", "3"]);
        assert_eq!(outcome.plan.get("4").unwrap().order, 3);
        assert_eq!(outcome.plan.get("3").unwrap().order, 4);
        assert_eq!(outcome.added, vec!["4", "3"]);
    }

    #[test]
    fn test_missing_tasks_are_kept() {
        let existing = plan("- [ ] 1. Search\n- [ ] 2. Reply");
        let outcome = merge_plan(&existing, &parse_tasks("- [x] 1. Search"));

        assert_eq!(outcome.plan.len(), 2);
        assert_eq!(outcome.plan.get("2").unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = plan("- [ ] 1. Search\n- [ ] 2. Reply");
        let proposed = parse_tasks("- [x] 1. Search\n- [ ] 2. Reply\n- [ ] 3. Close");

        let first = merge_plan(&existing, &proposed);
        let second = merge_plan(&first.plan, &proposed);

        assert!(second.is_noop());
        assert!(second.status_changes.is_empty());
        assert_eq!(second.plan, first.plan);
        assert_eq!(second.plan.len(), 3);
    }

    #[test]
    fn test_merge_into_empty_plan() {
        let outcome = merge_plan(&Plan::default(), &parse_tasks("- [ ] 1. a\n- [ ] 2. b"));
        assert_eq!(outcome.plan.len(), 2);
        assert_eq!(outcome.plan.tasks()[0].order, 1);
    }

    #[test]
    fn test_force_status() {
        let mut p = plan("- [ ] 1. Search\n- [x] 2. Reply");

        assert!(force_status(&mut p, "1", TaskStatus::Failed).unwrap());
        assert_eq!(p.get("1").unwrap().status, TaskStatus::Failed);

        // Already finished: no change
        assert!(!force_status(&mut p, "2", TaskStatus::Failed).unwrap());
        assert_eq!(p.get("2").unwrap().status, TaskStatus::Completed);

        assert!(matches!(
            force_status(&mut p, "9", TaskStatus::Completed),
            Err(CoreError::TaskNotFound(_))
        ));
        assert!(matches!(
            force_status(&mut p, "1", TaskStatus::Pending),
            Err(CoreError::Validation(_))
        ));
    }
}
