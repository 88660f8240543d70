use serde::{Deserialize, Serialize};

/// Checklist status of a single task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// The character written between the checklist brackets.
    pub fn marker(&self) -> char {
        match self {
            Self::Pending => ' ',
            Self::Completed => 'x',
            Self::Failed => '!',
        }
    }

    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            ' ' => Some(Self::Pending),
            'x' | 'X' => Some(Self::Completed),
            '!' => Some(Self::Failed),
            _ => None,
        }
    }

    /// Completed and Failed are both final.
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Task {
    /// Canonical identity derived from the checklist line.
    pub key: String,
    pub description: String,
    pub status: TaskStatus,
    /// First-seen position, never reassigned.
    pub order: u32,
}

impl Task {
    pub fn new(key: impl Into<String>, description: impl Into<String>, order: u32) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            status: TaskStatus::default(),
            order,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Render as a markdown checklist line.
    pub fn to_checklist_line(&self) -> String {
        format!("- [{}] {}", self.status.marker(), self.description)
    }
}
