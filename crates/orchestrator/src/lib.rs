//! Workflow execution core: planning, task execution, plan merging and
//! progress streaming for task-driven agents.

pub mod core;
pub mod error;
pub mod outcome;
pub mod phases;
pub mod plan_merge;
pub mod plan_parser;
pub mod prompts;
pub mod resources;
pub mod run_state;
pub mod runner;
pub mod services;
pub mod state_machine;
pub mod stores;

pub use error::{OrchestratorError, Result};
pub use outcome::{LenientOutcomePolicy, OutcomePolicy, TaskOutcome};
pub use plan_merge::{force_status, merge_plan, MergeOutcome, RejectReason};
pub use plan_parser::{
    classify_planner_output, clean_plan, extract_task_key, parse_plan, parse_tasks, PlannerOutput,
};
pub use runner::{RunHandle, RunReport, WorkflowRunner};
pub use services::{
    ChatModel, FnToolSet, NoTools, RunnerConfig, RunnerDeps, ScriptedChatModel, ScriptedReply,
    ToolInfo, ToolSet,
};
pub use state_machine::{RunState, TaskStateMachine};
pub use stores::{FilePlanStore, InMemoryHistoryStore, MemoryPlanStore, MessageHistoryStore, PlanStore};
