use async_trait::async_trait;
use taskflow_core::TaskStatus;
use tracing::{info, warn};

use crate::core::{Phase, PhaseOutcome};
use crate::error::{OrchestratorError, Result};
use crate::outcome::{merge_with_outcome, TaskOutcome};
use crate::plan_merge::force_status;
use crate::plan_parser::parse_tasks;
use crate::prompts::PhasePrompts;
use crate::run_state::WorkflowRun;
use crate::services::RunContext;
use crate::state_machine::RunState;

/// Folds the step result into the plan.
///
/// The outcome policy decides success or failure of the step, the
/// updater's checklist is merged under that outcome, and an unusable
/// checklist completes the current task.
pub struct UpdatePhase;

#[async_trait]
impl Phase for UpdatePhase {
    fn state(&self) -> RunState {
        RunState::Updating
    }

    fn label(&self) -> &'static str {
        "updater"
    }

    fn start_message(&self, _run: &WorkflowRun) -> String {
        "Updating the plan".to_string()
    }

    async fn execute(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<PhaseOutcome> {
        let task = run.active_task.clone().ok_or_else(|| {
            OrchestratorError::InvalidInput("updater reached without an active task".to_string())
        })?;

        let messages = PhasePrompts::updater(&run.plan, &task, &run.step_messages);
        let reply = ctx.generate(ctx.deps.model.as_ref(), &messages).await?;

        let outcome = ctx.deps.outcome_policy.evaluate(&run.step_messages);
        let failures = match &outcome {
            TaskOutcome::Success => {
                run.failures.reset(&task.key);
                0
            }
            TaskOutcome::Failure { reason } => {
                let count = run.failures.record_failure(&task.key);
                warn!(
                    session_id = %run.session_id,
                    task_key = %task.key,
                    failures = count,
                    reason = %reason,
                    "Step failed"
                );
                count
            }
        };

        let proposed = parse_tasks(&reply.content);
        let (message, rejected) = if proposed.is_empty() {
            warn!(
                task_key = %task.key,
                "Updater returned no checklist, completing current task"
            );
            force_status(&mut run.plan, &task.key, TaskStatus::Completed)?;
            ("Auto-completed current task".to_string(), 0)
        } else {
            let merged = merge_with_outcome(&run.plan, proposed, &task.key, &outcome);
            let message = format!(
                "{} added, {} status changes, {} rejected",
                merged.added.len(),
                merged.status_changes.len(),
                merged.rejected.len()
            );
            let rejected = merged.rejected.len();
            run.plan = merged.plan;
            (message, rejected)
        };

        let status = run
            .plan
            .get(&task.key)
            .map(|t| t.status)
            .unwrap_or(TaskStatus::Pending);
        info!(
            session_id = %run.session_id,
            task_key = %task.key,
            status = %status,
            success = outcome.is_success(),
            "Plan updated"
        );

        Ok(PhaseOutcome::new(RunState::WriteUpdatedPlan, message)
            .with_payload("task_key", task.key)
            .with_payload("status", status.as_str())
            .with_payload("outcome", if outcome.is_success() { "success" } else { "failure" })
            .with_payload("failures", failures)
            .with_payload("rejected", rejected))
    }
}
