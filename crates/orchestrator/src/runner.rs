//! Workflow runner: starts runs in the background and reports their end.
//!
//! Every run is an independent tokio task bounded by the configured
//! timeout. The caller gets a [`RunHandle`] with the progress stream and
//! a cancel handle. Dropping the stream does not stop the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use events::{channel, ProgressEvent, ProgressSender, ProgressStream};
use serde::Serialize;
use taskflow_core::{ChatMessage, Plan};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::core::{PhaseEngine, RunEmitter};
use crate::error::{OrchestratorError, Result};
use crate::resources::{RunGuard, SessionLocks};
use crate::run_state::{trim_history, WorkflowRun};
use crate::services::{RunContext, RunnerConfig, RunnerDeps};
use crate::state_machine::RunState;

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub session_id: String,
    /// `End` unless the run stopped early
    pub final_state: RunState,
    pub final_plan: Plan,
    pub answer: Option<String>,
    /// Failure counts per task key at the end of the run
    pub failures: BTreeMap<String, u32>,
    pub steps: u32,
    /// Fatal error that stopped the run
    pub error: Option<String>,
    pub dropped_events: usize,
}

impl RunReport {
    fn from_run(run: &WorkflowRun, error: Option<String>, dropped_events: usize) -> Self {
        Self {
            run_id: run.run_id,
            session_id: run.session_id.clone(),
            final_state: run.state,
            final_plan: run.plan.clone(),
            answer: run.answer.clone(),
            failures: run.failures.snapshot(),
            steps: run.steps,
            error,
            dropped_events,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.final_state.is_terminal()
    }
}

/// Caller's side of a background run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    session_id: String,
    cancel: CancellationToken,
    events: ProgressStream,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Ask the run to stop. It ends with an `Error` event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next progress event; `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    pub fn events_mut(&mut self) -> &mut ProgressStream {
        &mut self.events
    }

    /// Drain every event, then wait for the report.
    pub async fn collect(self) -> (Vec<ProgressEvent>, Option<RunReport>) {
        let events = self.events.collect_all().await;
        let report = match self.task.await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Run task did not finish cleanly");
                None
            }
        };
        (events, report)
    }

    /// Stop listening and wait for the report.
    pub async fn report(self) -> Option<RunReport> {
        drop(self.events);
        self.task.await.ok()
    }
}

struct RunnerInner {
    deps: RunnerDeps,
    config: RunnerConfig,
    engine: PhaseEngine,
    locks: SessionLocks,
}

/// Entry point for starting workflow runs.
#[derive(Clone)]
pub struct WorkflowRunner {
    inner: Arc<RunnerInner>,
}

impl WorkflowRunner {
    pub fn new(deps: RunnerDeps, config: RunnerConfig) -> Self {
        Self::with_engine(deps, config, PhaseEngine::new())
    }

    pub fn with_engine(deps: RunnerDeps, config: RunnerConfig, engine: PhaseEngine) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                deps,
                config,
                engine,
                locks: SessionLocks::new(),
            }),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.inner.config
    }

    pub fn deps(&self) -> &RunnerDeps {
        &self.inner.deps
    }

    /// Whether a run is active for the session.
    pub fn is_running(&self, session_id: &str) -> bool {
        self.inner.locks.is_active(session_id)
    }

    /// Start a run in the background.
    ///
    /// Fails with `SessionBusy` when the session already has an active run.
    pub fn start_run(
        &self,
        session_id: impl Into<String>,
        query: impl Into<String>,
        history: Vec<ChatMessage>,
    ) -> Result<RunHandle> {
        let (run, guard) = self.inner.prepare(session_id.into(), query.into(), history)?;
        let (sender, events) = channel(self.inner.config.event_capacity);
        let cancel = CancellationToken::new();

        let run_id = run.run_id;
        let session_id = run.session_id.clone();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let task = tokio::spawn(async move { inner.run(run, guard, sender, token).await });

        Ok(RunHandle {
            run_id,
            session_id,
            cancel,
            events,
            task,
        })
    }

    /// Start a run with the session's stored history.
    pub async fn start_session_run(
        &self,
        session_id: impl Into<String>,
        query: impl Into<String>,
    ) -> Result<RunHandle> {
        let session_id = session_id.into();
        let history = self
            .inner
            .deps
            .history
            .get_recent(&session_id, self.inner.config.history_limit)
            .await?;
        self.start_run(session_id, query, history)
    }

    /// Run to completion on the current task, publishing to `sender`.
    ///
    /// Fatal run errors are reported in the returned report and as the
    /// terminal `Error` event.
    pub async fn execute(
        &self,
        session_id: impl Into<String>,
        query: impl Into<String>,
        history: Vec<ChatMessage>,
        sender: ProgressSender,
    ) -> Result<RunReport> {
        let (run, guard) = self.inner.prepare(session_id.into(), query.into(), history)?;
        Ok(self
            .inner
            .run(run, guard, sender, CancellationToken::new())
            .await)
    }
}

impl RunnerInner {
    fn prepare(
        &self,
        session_id: String,
        query: String,
        history: Vec<ChatMessage>,
    ) -> Result<(WorkflowRun, RunGuard)> {
        if session_id.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "session id must not be empty".to_string(),
            ));
        }
        if query.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "query must not be empty".to_string(),
            ));
        }

        let history = trim_history(history, self.config.history_limit);
        let run = WorkflowRun::new(session_id, query, history, self.config.max_retries);
        let guard = self.locks.try_acquire(&run.session_id, run.run_id)?;
        Ok((run, guard))
    }

    async fn run(
        &self,
        mut run: WorkflowRun,
        mut guard: RunGuard,
        sender: ProgressSender,
        cancel: CancellationToken,
    ) -> RunReport {
        let session_id = run.session_id.clone();
        let run_id = run.run_id;
        let timeout = self.config.run_timeout();
        info!(session_id = %session_id, run_id = %run_id, "Workflow run started");

        let result = {
            let emitter = RunEmitter::new(&sender, run_id, &session_id);
            let ctx = RunContext::new(&self.deps, &self.config, emitter, cancel.clone());
            match tokio::time::timeout(timeout, self.engine.drive(&ctx, &mut run)).await {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel();
                    Err(OrchestratorError::Timeout {
                        duration_ms: timeout.as_millis() as u64,
                    })
                }
            }
        };

        if result.is_ok() {
            self.record_history(&run).await;
        }

        let report = RunReport::from_run(
            &run,
            result.as_ref().err().map(ToString::to_string),
            sender.dropped_count(),
        );

        let terminal = match &result {
            Ok(()) => {
                info!(
                    session_id = %session_id,
                    run_id = %run_id,
                    steps = run.steps,
                    dropped_events = report.dropped_events,
                    "Workflow run finished"
                );
                ProgressEvent::done("Run completed").with_payload("steps", run.steps)
            }
            Err(e) => {
                error!(
                    session_id = %session_id,
                    run_id = %run_id,
                    state = %run.state,
                    error = %e,
                    "Workflow run failed"
                );
                ProgressEvent::error("runner", e.to_string()).with_payload("state", run.state.as_str())
            }
        };
        let terminal = RunEmitter::new(&sender, run_id, &session_id).tag(terminal);

        guard.mark_completed();
        drop(guard);
        sender.finish(terminal).await;
        report
    }

    async fn record_history(&self, run: &WorkflowRun) {
        let Some(answer) = run.answer.as_deref().filter(|a| !a.trim().is_empty()) else {
            return;
        };

        for message in [ChatMessage::user(run.query.as_str()), ChatMessage::assistant(answer)] {
            if let Err(e) = self.deps.history.append(&run.session_id, message).await {
                warn!(session_id = %run.session_id, error = %e, "Failed to record history");
                return;
            }
        }
    }
}
