use async_trait::async_trait;

use crate::core::{Phase, PhaseOutcome};
use crate::error::Result;
use crate::run_state::WorkflowRun;
use crate::services::RunContext;
use crate::state_machine::RunState;

/// Streams the planner's reply as the answer. Never touches the plan store.
pub struct DirectReplyPhase;

#[async_trait]
impl Phase for DirectReplyPhase {
    fn state(&self) -> RunState {
        RunState::DirectReply
    }

    fn label(&self) -> &'static str {
        "direct_reply"
    }

    async fn execute(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<PhaseOutcome> {
        let answer = run.planner_output.take().unwrap_or_default();
        ctx.events.result_chunk(self.label(), "answer", answer.clone());
        run.answer = Some(answer);

        Ok(PhaseOutcome::new(RunState::End, "Replied without a plan"))
    }
}
