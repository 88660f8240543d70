//! Core abstractions for running workflow phases.
//!
//! - [`Phase`] - Trait that every phase implements
//! - [`PhaseOutcome`] - Next state plus event summary
//! - [`PhaseEngine`] - State machine loop over the phases
//! - [`RunEmitter`] - Run-tagged progress events

mod events;
mod execution;
mod phase;

pub use events::RunEmitter;
pub use execution::PhaseEngine;
pub use phase::{Phase, PhaseOutcome};
