//! Phase trait: one implementation per non-terminal run state.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::run_state::WorkflowRun;
use crate::services::RunContext;
use crate::state_machine::RunState;

/// What a phase decided: the next state plus a summary for its
/// `Complete` event.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseOutcome {
    pub next: RunState,
    pub message: String,
    pub payload: Map<String, Value>,
}

impl PhaseOutcome {
    pub fn new(next: RunState, message: impl Into<String>) -> Self {
        Self {
            next,
            message: message.into(),
            payload: Map::new(),
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait Phase: Send + Sync {
    /// The run state this phase handles.
    fn state(&self) -> RunState;

    /// Event label, e.g. `planner`.
    fn label(&self) -> &'static str;

    /// Message of the phase's `Start` event.
    fn start_message(&self, _run: &WorkflowRun) -> String {
        format!("{} started", self.label())
    }

    async fn execute(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<PhaseOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_payload() {
        let outcome = PhaseOutcome::new(RunState::Scanning, "Plan written")
            .with_payload("version", 2)
            .with_payload("tasks", 3);

        assert_eq!(outcome.next, RunState::Scanning);
        assert_eq!(outcome.payload["version"], 2);
        assert_eq!(outcome.payload.len(), 2);
    }
}
