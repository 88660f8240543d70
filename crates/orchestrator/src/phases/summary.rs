use async_trait::async_trait;
use futures::StreamExt;
use tracing::info;

use crate::core::{Phase, PhaseOutcome};
use crate::error::Result;
use crate::prompts::PhasePrompts;
use crate::run_state::WorkflowRun;
use crate::services::RunContext;
use crate::state_machine::RunState;

/// Streams the final answer.
pub struct SummaryPhase;

#[async_trait]
impl Phase for SummaryPhase {
    fn state(&self) -> RunState {
        RunState::Summarizing
    }

    fn label(&self) -> &'static str {
        "summarizer"
    }

    fn start_message(&self, _run: &WorkflowRun) -> String {
        "Summarizing the results".to_string()
    }

    async fn execute(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<PhaseOutcome> {
        let messages = PhasePrompts::summarizer(&run.query, &run.plan, &run.history);
        let mut stream = ctx.cancellable(ctx.deps.model.stream(&messages)).await?;

        let mut answer = String::new();
        let mut chunks = 0usize;
        while let Some(chunk) = ctx.cancellable(async { Ok(stream.next().await) }).await? {
            let chunk = chunk?;
            if chunk.content.is_empty() {
                continue;
            }
            ctx.events.result_chunk(self.label(), "summary", chunk.content.as_str());
            answer.push_str(&chunk.content);
            chunks += 1;
        }

        info!(session_id = %run.session_id, chunks, chars = answer.len(), "Summary streamed");
        run.answer = Some(answer);
        Ok(PhaseOutcome::new(RunState::End, "Summary delivered").with_payload("chunks", chunks))
    }
}
