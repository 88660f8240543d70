//! Phase implementations, one per run state.

mod direct_reply;
mod execution;
mod planning;
mod scanning;
mod summary;
mod tools;
mod update;
mod write_plan;

pub use direct_reply::DirectReplyPhase;
pub use execution::ExecutionPhase;
pub use planning::PlanningPhase;
pub use scanning::ScanningPhase;
pub use summary::SummaryPhase;
pub use tools::ToolInvocationPhase;
pub use update::UpdatePhase;
pub use write_plan::{WritePlanPhase, WriteUpdatedPlanPhase};
