use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{Task, TaskStatus};

/// Ordered task list for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Plan {
    tasks: Vec<Task>,
}

impl Plan {
    /// Build a plan, sorting by `order`.
    pub fn new(mut tasks: Vec<Task>) -> Self {
        tasks.sort_by_key(|t| t.order);
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn get(&self, key: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.key == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.key == key)
    }

    /// The task currently being worked on: first Pending in order.
    pub fn first_pending(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.is_pending())
    }

    pub fn max_order(&self) -> u32 {
        self.tasks.iter().map(|t| t.order).max().unwrap_or(0)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_finished())
    }

    /// Render the plan as markdown checklist text, one task per line.
    pub fn to_markdown(&self) -> String {
        self.tasks
            .iter()
            .map(Task::to_checklist_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One persisted version of a session's plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PlanVersion {
    pub session_id: String,
    pub version: u32,
    pub content: String,
    pub written_at: DateTime<Utc>,
}

impl PlanVersion {
    pub fn new(session_id: impl Into<String>, version: u32, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            version,
            content: content.into(),
            written_at: Utc::now(),
        }
    }
}
