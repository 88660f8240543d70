use taskflow_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Plan not found for session: {0}")]
    PlanNotFound(String),

    #[error("Failed to write plan for session {session_id}: {reason}")]
    PlanWriteFailed { session_id: String, reason: String },

    #[error("Plan text contains no task lines: {0}")]
    InvalidPlanFormat(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Tool {tool} failed: {reason}")]
    Tool { tool: String, reason: String },

    #[error("Progress buffer full, event dropped")]
    ChannelFull,

    #[error("A workflow run is already active for session: {0}")]
    SessionBusy(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Run exceeded the step budget of {0} transitions")]
    StepBudgetExceeded(u32),

    #[error("Run timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OrchestratorError {
    /// Create a model error.
    pub fn model(reason: impl std::fmt::Display) -> Self {
        Self::Model(reason.to_string())
    }

    /// Create a plan write failure.
    pub fn plan_write(session_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::PlanWriteFailed {
            session_id: session_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a tool failure.
    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error terminates the run when it escapes a phase.
    ///
    /// Everything else has a local recovery path.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::PlanNotFound(_)
                | Self::PlanWriteFailed { .. }
                | Self::InvalidPlanFormat(_)
                | Self::Tool { .. }
                | Self::ChannelFull
        )
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
