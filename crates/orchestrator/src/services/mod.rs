pub mod executor_context;
pub mod model;
pub mod scripted;
pub mod tools;

pub use executor_context::{RunContext, RunnerConfig, RunnerDeps};
pub use model::{ChatModel, MessageStream, ToolInfo};
pub use scripted::{ScriptedChatModel, ScriptedReply};
pub use tools::{FnToolSet, NoTools, ToolSet};
