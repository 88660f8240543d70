//! Drives a run through its phases.

use std::collections::HashMap;

use events::ProgressEvent;
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};
use crate::phases;
use crate::run_state::WorkflowRun;
use crate::services::RunContext;
use crate::state_machine::RunState;

use super::phase::Phase;

/// Maps every non-terminal state to its phase and runs the state machine.
pub struct PhaseEngine {
    phases: HashMap<RunState, Box<dyn Phase>>,
}

impl Default for PhaseEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseEngine {
    /// Engine with the standard phase set.
    pub fn new() -> Self {
        let mut engine = Self {
            phases: HashMap::new(),
        };
        engine.register(Box::new(phases::PlanningPhase));
        engine.register(Box::new(phases::WritePlanPhase));
        engine.register(Box::new(phases::DirectReplyPhase));
        engine.register(Box::new(phases::ScanningPhase));
        engine.register(Box::new(phases::ExecutionPhase));
        engine.register(Box::new(phases::ToolInvocationPhase));
        engine.register(Box::new(phases::UpdatePhase));
        engine.register(Box::new(phases::WriteUpdatedPlanPhase));
        engine.register(Box::new(phases::SummaryPhase));
        engine
    }

    /// Install a phase, replacing any phase for the same state.
    pub fn register(&mut self, phase: Box<dyn Phase>) {
        self.phases.insert(phase.state(), phase);
    }

    /// Run until `End`, the step budget, cancellation or a fatal error.
    pub async fn drive(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<()> {
        while !run.state.is_terminal() {
            if run.steps >= ctx.config.max_steps {
                return Err(OrchestratorError::StepBudgetExceeded(ctx.config.max_steps));
            }
            if ctx.cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            let next = match run.state {
                RunState::Start => RunState::Planning,
                _ => self.run_phase(ctx, run).await?,
            };

            run.state.validate_transition(next)?;
            debug!(
                run_id = %run.run_id,
                from = %run.state,
                to = %next,
                step = run.steps + 1,
                "State transition"
            );
            run.state = next;
            run.steps += 1;
        }

        run.terminated = true;
        Ok(())
    }

    async fn run_phase(&self, ctx: &RunContext<'_>, run: &mut WorkflowRun) -> Result<RunState> {
        let phase = self.phases.get(&run.state).ok_or_else(|| {
            OrchestratorError::InvalidTransition {
                from: run.state.as_str().to_string(),
                to: "<no phase registered>".to_string(),
            }
        })?;

        info!(
            run_id = %run.run_id,
            session_id = %run.session_id,
            phase = phase.label(),
            "Executing phase"
        );
        ctx.events.start(phase.label(), phase.start_message(run));

        let outcome = phase.execute(ctx, run).await?;

        let mut event = ProgressEvent::complete(phase.label(), outcome.message)
            .with_payload("next", outcome.next.as_str());
        event.payload.extend(outcome.payload);
        ctx.events.emit(event);

        info!(
            run_id = %run.run_id,
            phase = phase.label(),
            next = %outcome.next,
            "Phase completed"
        );
        Ok(outcome.next)
    }
}
