use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::{Phase, PhaseOutcome};
use crate::error::{OrchestratorError, Result};
use crate::prompts::PhasePrompts;
use crate::run_state::WorkflowRun;
use crate::services::RunContext;
use crate::state_machine::RunState;

/// Runs the active task against the model, possibly requesting tools.
pub struct ExecutionPhase;

#[async_trait]
impl Phase for ExecutionPhase {
    fn state(&self) -> RunState {
        RunState::Executing
    }

    fn label(&self) -> &'static str {
        "executor"
    }

    fn start_message(&self, run: &WorkflowRun) -> String {
        match &run.active_task {
            Some(task) if run.tool_rounds > 0 => {
                format!("Continuing {} after tool round {}", task.description, run.tool_rounds)
            }
            Some(task) => format!("Executing {}", task.description),
            None => "Executing".to_string(),
        }
    }

    async fn execute(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<PhaseOutcome> {
        let task = run.active_task.clone().ok_or_else(|| {
            OrchestratorError::InvalidInput("executor reached without an active task".to_string())
        })?;

        let mut messages = PhasePrompts::executor(&run.query, &task, &run.plan, &run.history);
        messages.extend(run.step_messages.iter().cloned());

        let reply = ctx.generate(ctx.executor_model.as_ref(), &messages).await?;
        let wants_tools = reply.has_tool_calls();
        let calls = reply.tool_calls.len();
        run.step_messages.push(reply);

        if !wants_tools {
            debug!(task_key = %task.key, "Executor finished the step");
            return Ok(PhaseOutcome::new(RunState::Updating, "Step finished")
                .with_payload("task_key", task.key));
        }

        if run.tool_rounds >= ctx.config.max_tool_rounds {
            warn!(
                task_key = %task.key,
                rounds = run.tool_rounds,
                "Tool round limit reached, moving on to update"
            );
            return Ok(PhaseOutcome::new(RunState::Updating, "Tool round limit reached")
                .with_payload("task_key", task.key)
                .with_payload("tool_rounds", run.tool_rounds));
        }

        Ok(
            PhaseOutcome::new(RunState::ToolInvocation, format!("Requested {} tool calls", calls))
                .with_payload("task_key", task.key)
                .with_payload("tool_calls", calls),
        )
    }
}
