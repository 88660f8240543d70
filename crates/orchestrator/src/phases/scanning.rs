use async_trait::async_trait;
use events::ProgressEvent;
use taskflow_core::TaskStatus;
use tracing::{debug, warn};

use super::write_plan::{load_plan, persist_plan};
use crate::core::{Phase, PhaseOutcome};
use crate::error::Result;
use crate::plan_merge::force_status;
use crate::run_state::WorkflowRun;
use crate::services::RunContext;
use crate::state_machine::RunState;

/// Picks the next pending task, failing tasks that ran out of retries.
pub struct ScanningPhase;

#[async_trait]
impl Phase for ScanningPhase {
    fn state(&self) -> RunState {
        RunState::Scanning
    }

    fn label(&self) -> &'static str {
        "scanner"
    }

    fn start_message(&self, _run: &WorkflowRun) -> String {
        "Looking for the next task".to_string()
    }

    async fn execute(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<PhaseOutcome> {
        loop {
            run.plan = load_plan(ctx, run).await?;

            let Some(task) = run.plan.first_pending().cloned() else {
                debug!(session_id = %run.session_id, "No pending task left");
                run.finish_task();
                return Ok(PhaseOutcome::new(RunState::Summarizing, "All tasks finished")
                    .with_payload("completed", run.plan.count(TaskStatus::Completed))
                    .with_payload("failed", run.plan.count(TaskStatus::Failed)));
            };

            let failures = run.failures.get(&task.key);
            if !run.failures.is_exhausted(&task.key, run.max_retries) {
                debug!(task_key = %task.key, failures, "Next task selected");
                let message = format!("Next task: {}", task.description);
                let key = task.key.clone();
                run.begin_task(task);
                return Ok(PhaseOutcome::new(RunState::Executing, message)
                    .with_payload("task_key", key)
                    .with_payload("failures", failures));
            }

            warn!(
                session_id = %run.session_id,
                task_key = %task.key,
                failures,
                max_retries = run.max_retries,
                "Retries exhausted, forcing task to failed"
            );
            let mut plan = run.plan.clone();
            force_status(&mut plan, &task.key, TaskStatus::Failed)?;
            persist_plan(ctx, run, plan).await?;

            ctx.events.emit(
                ProgressEvent::complete(self.label(), format!("Gave up on: {}", task.description))
                    .with_payload("task_key", task.key.as_str())
                    .with_payload("forced", TaskStatus::Failed.as_str())
                    .with_payload("failures", failures),
            );
        }
    }
}
