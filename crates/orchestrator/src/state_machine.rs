use serde::{Deserialize, Serialize};
use taskflow_core::{CoreError, TaskStatus};

use crate::error::{OrchestratorError, Result};

/// Status rules for tasks inside a plan.
///
/// A Pending task may only finish while it is the task currently being
/// worked on. Finished tasks never change status again.
pub struct TaskStateMachine;

impl TaskStateMachine {
    pub fn validate_transition(
        from: &TaskStatus,
        to: &TaskStatus,
        is_current: bool,
    ) -> std::result::Result<(), CoreError> {
        if Self::allowed_transitions(from, is_current).contains(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidStatusTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &TaskStatus, is_current: bool) -> Vec<TaskStatus> {
        match from {
            TaskStatus::Pending if is_current => vec![
                TaskStatus::Pending,
                TaskStatus::Completed,
                TaskStatus::Failed,
            ],
            TaskStatus::Pending => vec![TaskStatus::Pending],
            TaskStatus::Completed => vec![TaskStatus::Completed],
            TaskStatus::Failed => vec![TaskStatus::Failed],
        }
    }

    pub fn can_transition(from: &TaskStatus, to: &TaskStatus, is_current: bool) -> bool {
        Self::validate_transition(from, to, is_current).is_ok()
    }
}

/// States of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Start,
    Planning,
    WritePlan,
    DirectReply,
    Scanning,
    Executing,
    ToolInvocation,
    Updating,
    WriteUpdatedPlan,
    Summarizing,
    End,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Planning => "planning",
            Self::WritePlan => "write_plan",
            Self::DirectReply => "direct_reply",
            Self::Scanning => "scanning",
            Self::Executing => "executing",
            Self::ToolInvocation => "tool_invocation",
            Self::Updating => "updating",
            Self::WriteUpdatedPlan => "write_updated_plan",
            Self::Summarizing => "summarizing",
            Self::End => "end",
        }
    }

    fn allowed_transitions(&self) -> &'static [RunState] {
        match self {
            Self::Start => &[Self::Planning],
            Self::Planning => &[Self::WritePlan, Self::DirectReply],
            Self::WritePlan => &[Self::Scanning],
            Self::DirectReply => &[Self::End],
            Self::Scanning => &[Self::Executing, Self::Summarizing],
            Self::Executing => &[Self::ToolInvocation, Self::Updating],
            Self::ToolInvocation => &[Self::Executing],
            Self::Updating => &[Self::WriteUpdatedPlan],
            Self::WriteUpdatedPlan => &[Self::Scanning],
            Self::Summarizing => &[Self::End],
            Self::End => &[],
        }
    }

    pub fn validate_transition(&self, to: RunState) -> Result<()> {
        if self.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    pub fn can_transition(&self, to: RunState) -> bool {
        self.validate_transition(to).is_ok()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
