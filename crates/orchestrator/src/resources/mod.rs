//! RAII resource guards.
//!
//! - [`SessionLocks`] / [`RunGuard`] - one active run per session

mod run_guard;

pub use run_guard::{RunGuard, SessionLocks};
