//! Success/failure decision for one execution step.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use taskflow_core::{ChatMessage, Plan, Role, Task, TaskStatus};
use tracing::{debug, warn};

use crate::error::{OrchestratorError, Result};
use crate::plan_merge::{force_status, merge_plan, MergeOutcome, StatusChange};

/// Narrow indicators of a step that did not do its job.
static SEVERE_ERROR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Authentication and authorization
        r"(?i)\b(unauthori[sz]ed|forbidden|authentication failed|authorization failed|invalid api key|access denied)\b",
        // Server-side HTTP errors
        r"\b50[0234]\b",
        // Timeouts and network trouble
        r"(?i)\b(timed out|timeout|connection refused|connection reset|network error|network unreachable|dns error)\b",
        // Syntax and compile errors
        r"(?i)\b(syntax error|compile error|compilation failed|failed to compile)\b",
        // Filesystem access
        r"(?i)(no such file or directory|permission denied|read-only file system|disk full)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid severe error pattern"))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failure { reason: String },
}

impl TaskOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Decides whether the messages of one execution step count as success.
pub trait OutcomePolicy: Send + Sync {
    fn evaluate(&self, step: &[ChatMessage]) -> TaskOutcome;
}

/// Treats a step as successful unless it shows a severe error.
///
/// The last message of the step is scanned for the built-in indicators
/// plus any extra patterns. Structured tool errors from the same step
/// also count as failures when their text mentions an error.
#[derive(Debug, Clone, Default)]
pub struct LenientOutcomePolicy {
    extra: Vec<Regex>,
}

impl LenientOutcomePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add indicator patterns on top of the built-in ones.
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let regex = Regex::new(pattern.as_ref()).map_err(|e| {
                OrchestratorError::InvalidInput(format!(
                    "bad outcome pattern {:?}: {}",
                    pattern.as_ref(),
                    e
                ))
            })?;
            self.extra.push(regex);
        }
        Ok(self)
    }

    fn severe_indicator<'a>(&self, text: &'a str) -> Option<&'a str> {
        SEVERE_ERROR_PATTERNS
            .iter()
            .chain(self.extra.iter())
            .find_map(|re| re.find(text))
            .map(|m| m.as_str())
    }
}

impl OutcomePolicy for LenientOutcomePolicy {
    fn evaluate(&self, step: &[ChatMessage]) -> TaskOutcome {
        if let Some(last) = step.last() {
            if let Some(indicator) = self.severe_indicator(&last.content) {
                debug!(indicator, "Severe error indicator in step output");
                return TaskOutcome::failure(format!("severe error indicator: {}", indicator));
            }
        }

        for message in step.iter().filter(|m| m.role == Role::Tool) {
            if let Some(text) = tool_error_text(message) {
                if text.to_lowercase().contains("error") {
                    let tool = message.name.as_deref().unwrap_or("tool");
                    return TaskOutcome::failure(format!("{} returned an error: {}", tool, text));
                }
            }
        }

        TaskOutcome::Success
    }
}

/// Error text of a structured tool error, if the message is one.
fn tool_error_text(message: &ChatMessage) -> Option<String> {
    if message.is_error {
        return Some(message.content.clone());
    }

    match serde_json::from_str::<Value>(&message.content) {
        Ok(Value::Object(map)) => map.get("error").map(|e| match e {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        _ => None,
    }
}

/// Merge an updater proposal after adjusting it for the step outcome.
///
/// On failure a Completed proposal for the current task is held at
/// Pending. On success a current task left Pending is promoted to
/// Completed. An explicit Failed proposal goes through as is.
pub fn merge_with_outcome(
    existing: &Plan,
    mut proposed: Vec<Task>,
    current_key: &str,
    outcome: &TaskOutcome,
) -> MergeOutcome {
    if !outcome.is_success() {
        for task in proposed
            .iter_mut()
            .filter(|t| t.key == current_key && t.status == TaskStatus::Completed)
        {
            debug!(task_key = %current_key, "Holding failed task at pending");
            task.status = TaskStatus::Pending;
        }
    }

    let mut merged = merge_plan(existing, &proposed);

    if outcome.is_success() {
        match force_status(&mut merged.plan, current_key, TaskStatus::Completed) {
            Ok(true) => {
                debug!(task_key = %current_key, "Promoted successful task to completed");
                merged.status_changes.push(StatusChange {
                    key: current_key.to_string(),
                    from: TaskStatus::Pending,
                    to: TaskStatus::Completed,
                });
            }
            Ok(false) => {}
            Err(e) => warn!(task_key = %current_key, error = %e, "Current task missing after merge"),
        }
    }

    merged
}
