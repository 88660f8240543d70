use async_trait::async_trait;
use tracing::debug;

use crate::core::{Phase, PhaseOutcome};
use crate::error::{OrchestratorError, Result};
use crate::run_state::WorkflowRun;
use crate::services::RunContext;
use crate::state_machine::RunState;

/// Runs the tool calls of the executor's last reply.
pub struct ToolInvocationPhase;

#[async_trait]
impl Phase for ToolInvocationPhase {
    fn state(&self) -> RunState {
        RunState::ToolInvocation
    }

    fn label(&self) -> &'static str {
        "tools"
    }

    async fn execute(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<PhaseOutcome> {
        let request = run
            .step_messages
            .last()
            .filter(|m| m.has_tool_calls())
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::InvalidInput("no pending tool calls".to_string())
            })?;

        let results = ctx.invoke_tools(&request).await?;
        let failed = results.iter().filter(|m| m.is_error).count();
        debug!(calls = results.len(), failed, "Tool round finished");

        run.tool_rounds += 1;
        let total = results.len();
        run.step_messages.extend(results);

        Ok(PhaseOutcome::new(
            RunState::Executing,
            format!("Ran {} tool calls, {} failed", total, failed),
        )
        .with_payload("tool_round", run.tool_rounds)
        .with_payload("failed", failed))
    }
}
