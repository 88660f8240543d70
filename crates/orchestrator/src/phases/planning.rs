//! Planning phase: ask the model for a checklist or a direct reply.

use async_trait::async_trait;
use tracing::info;

use crate::core::{Phase, PhaseOutcome};
use crate::error::Result;
use crate::plan_parser::{classify_planner_output, PlannerOutput};
use crate::prompts::PhasePrompts;
use crate::run_state::WorkflowRun;
use crate::services::RunContext;
use crate::state_machine::RunState;

pub struct PlanningPhase;

#[async_trait]
impl Phase for PlanningPhase {
    fn state(&self) -> RunState {
        RunState::Planning
    }

    fn label(&self) -> &'static str {
        "planner"
    }

    fn start_message(&self, _run: &WorkflowRun) -> String {
        "Planning the request".to_string()
    }

    async fn execute(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<PhaseOutcome> {
        let messages = PhasePrompts::planner(&run.query, &run.history);
        let reply = ctx.generate(ctx.deps.model.as_ref(), &messages).await?;

        match classify_planner_output(&reply.content) {
            PlannerOutput::Plan(plan) => {
                info!(
                    session_id = %run.session_id,
                    tasks = plan.len(),
                    "Planner produced a checklist"
                );
                let tasks = plan.len();
                run.plan = plan;
                Ok(PhaseOutcome::new(
                    RunState::WritePlan,
                    format!("Planned {} tasks", tasks),
                )
                .with_payload("tasks", tasks))
            }
            PlannerOutput::DirectReply(text) => {
                info!(session_id = %run.session_id, "Planner answered directly");
                run.planner_output = Some(text);
                Ok(PhaseOutcome::new(RunState::DirectReply, "Replying directly"))
            }
        }
    }
}
