use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskflow_core::ChatMessage;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::RunEmitter;
use crate::error::{OrchestratorError, Result};
use crate::outcome::{LenientOutcomePolicy, OutcomePolicy};
use crate::stores::{InMemoryHistoryStore, MemoryPlanStore, MessageHistoryStore, PlanStore};

use super::model::ChatModel;
use super::tools::{NoTools, ToolSet};

fn default_max_retries() -> u32 {
    3
}

fn default_event_capacity() -> usize {
    events::DEFAULT_CAPACITY
}

fn default_run_timeout_secs() -> u64 {
    30 * 60
}

fn default_max_tool_rounds() -> u32 {
    10
}

fn default_history_limit() -> usize {
    20
}

fn default_max_steps() -> u32 {
    500
}

/// Limits applied to every workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Failed update cycles before a task is forced to failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Progress buffer size per run
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Tool rounds per task before the executor moves on
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// History messages handed to the planner
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// State transitions per run before it is aborted
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            event_capacity: default_event_capacity(),
            run_timeout_secs: default_run_timeout_secs(),
            max_tool_rounds: default_max_tool_rounds(),
            history_limit: default_history_limit(),
            max_steps: default_max_steps(),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_max_steps(mut self, steps: u32) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

/// Collaborators shared by every run of a runner.
#[derive(Clone)]
pub struct RunnerDeps {
    pub model: Arc<dyn ChatModel>,
    pub tools: Arc<dyn ToolSet>,
    pub plans: Arc<dyn PlanStore>,
    pub history: Arc<dyn MessageHistoryStore>,
    pub outcome_policy: Arc<dyn OutcomePolicy>,
}

impl RunnerDeps {
    /// Dependencies with in-memory stores, no tools and the lenient policy.
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            tools: Arc::new(NoTools),
            plans: Arc::new(MemoryPlanStore::new()),
            history: Arc::new(InMemoryHistoryStore::new()),
            outcome_policy: Arc::new(LenientOutcomePolicy::new()),
        }
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolSet>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_plan_store(mut self, plans: Arc<dyn PlanStore>) -> Self {
        self.plans = plans;
        self
    }

    pub fn with_history_store(mut self, history: Arc<dyn MessageHistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn with_outcome_policy(mut self, policy: Arc<dyn OutcomePolicy>) -> Self {
        self.outcome_policy = policy;
        self
    }
}

/// Everything a phase needs while a run is in flight.
pub struct RunContext<'a> {
    pub deps: &'a RunnerDeps,
    pub config: &'a RunnerConfig,
    pub events: RunEmitter<'a>,
    pub cancel: CancellationToken,
    /// Model used by the executor; tool-bound when tools are available
    pub executor_model: Arc<dyn ChatModel>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        deps: &'a RunnerDeps,
        config: &'a RunnerConfig,
        events: RunEmitter<'a>,
        cancel: CancellationToken,
    ) -> Self {
        let infos = deps.tools.infos();
        let executor_model = if infos.is_empty() {
            Arc::clone(&deps.model)
        } else {
            match deps.model.bind_tools(&infos) {
                Some(bound) => bound,
                None => {
                    debug!(tools = infos.len(), "Model has no tool support, running without tools");
                    Arc::clone(&deps.model)
                }
            }
        };

        Self {
            deps,
            config,
            events,
            cancel,
            executor_model,
        }
    }

    /// Race a future against the run's cancellation.
    pub async fn cancellable<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(OrchestratorError::Cancelled),
            result = fut => result,
        }
    }

    pub async fn generate(&self, model: &dyn ChatModel, messages: &[ChatMessage]) -> Result<ChatMessage> {
        debug!(
            messages = messages.len(),
            prompt_chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "Calling model"
        );
        self.cancellable(model.generate(messages)).await
    }

    pub async fn invoke_tools(&self, message: &ChatMessage) -> Result<Vec<ChatMessage>> {
        self.cancellable(async { Ok(self.deps.tools.invoke_tool_calls(message).await) })
            .await
    }
}
