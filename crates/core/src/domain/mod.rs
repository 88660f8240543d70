mod message;
mod plan;
mod task;

pub use message::{ChatMessage, Role, ToolCall};
pub use plan::{Plan, PlanVersion};
pub use task::{Task, TaskStatus};
