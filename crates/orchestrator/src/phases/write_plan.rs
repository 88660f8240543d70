//! Plan persistence: the write-then-read sequence shared by every plan write.

use async_trait::async_trait;
use taskflow_core::{Plan, TaskStatus};
use tracing::{debug, info, warn};

use crate::core::{Phase, PhaseOutcome};
use crate::error::{OrchestratorError, Result};
use crate::plan_parser::parse_tasks;
use crate::run_state::WorkflowRun;
use crate::services::RunContext;
use crate::state_machine::RunState;

/// Append `plan` as a new version, then read the latest version back.
///
/// A failed write keeps the run going on the in-memory plan. Returns the
/// written version, if any.
pub(crate) async fn persist_plan(
    ctx: &RunContext<'_>,
    run: &mut WorkflowRun,
    plan: Plan,
) -> Result<Option<u32>> {
    let content = plan.to_markdown();
    run.plan = plan;

    let written = ctx
        .cancellable(ctx.deps.plans.append_version(&run.session_id, &content))
        .await;
    let version = match written {
        Ok(version) => version,
        Err(e) if !e.is_fatal() => {
            warn!(
                session_id = %run.session_id,
                error = %e,
                "Plan write failed, continuing with in-memory plan"
            );
            run.plan_synced = false;
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    info!(session_id = %run.session_id, version, tasks = run.plan.len(), "Plan version written");
    run.plan_synced = true;
    run.plan = load_plan(ctx, run).await?;
    Ok(Some(version))
}

/// The plan the run should act on: the store's latest version, or the
/// in-memory plan when the store is behind or unreadable.
pub(crate) async fn load_plan(ctx: &RunContext<'_>, run: &WorkflowRun) -> Result<Plan> {
    if !run.plan_synced {
        return Ok(run.plan.clone());
    }

    match ctx
        .cancellable(ctx.deps.plans.get_latest(&run.session_id))
        .await
    {
        Ok(latest) => Ok(Plan::new(parse_tasks(&latest.content))),
        Err(OrchestratorError::PlanNotFound(_)) => Ok(run.plan.clone()),
        Err(OrchestratorError::Cancelled) => Err(OrchestratorError::Cancelled),
        Err(e) if !run.plan.is_empty() => {
            warn!(
                session_id = %run.session_id,
                error = %e,
                "Plan read failed, using in-memory plan"
            );
            Ok(run.plan.clone())
        }
        Err(e) => Err(e),
    }
}

/// Writes the planner's checklist as a fresh version.
pub struct WritePlanPhase;

#[async_trait]
impl Phase for WritePlanPhase {
    fn state(&self) -> RunState {
        RunState::WritePlan
    }

    fn label(&self) -> &'static str {
        "plan_writer"
    }

    async fn execute(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<PhaseOutcome> {
        let plan = run.plan.clone();
        let outcome = match persist_plan(ctx, run, plan).await? {
            Some(version) => {
                PhaseOutcome::new(RunState::Scanning, format!("Plan version {} written", version))
                    .with_payload("version", version)
            }
            None => PhaseOutcome::new(RunState::Scanning, "Plan kept in memory")
                .with_payload("synced", false),
        };
        Ok(outcome)
    }
}

/// Writes the plan produced by the updater.
pub struct WriteUpdatedPlanPhase;

#[async_trait]
impl Phase for WriteUpdatedPlanPhase {
    fn state(&self) -> RunState {
        RunState::WriteUpdatedPlan
    }

    fn label(&self) -> &'static str {
        "plan_writer"
    }

    async fn execute(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<PhaseOutcome> {
        let plan = run.plan.clone();
        let version = persist_plan(ctx, run, plan).await?;
        if run.record_step_result() {
            debug!(
                session_id = %run.session_id,
                history = run.history.len(),
                "Step result added to run history"
            );
        }
        run.finish_task();

        let mut outcome = PhaseOutcome::new(RunState::Scanning, "Updated plan written")
            .with_payload("completed", run.plan.count(TaskStatus::Completed))
            .with_payload("failed", run.plan.count(TaskStatus::Failed))
            .with_payload("total", run.plan.len());
        outcome = match version {
            Some(version) => outcome.with_payload("version", version),
            None => outcome.with_payload("synced", false),
        };
        Ok(outcome)
    }
}
