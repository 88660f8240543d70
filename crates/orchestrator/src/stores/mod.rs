//! Persistence seams for plans and conversation history.
//!
//! - [`PlanStore`] - append-only versioned plans per session
//! - [`MessageHistoryStore`] - conversation messages per session
//! - [`MemoryPlanStore`], [`FilePlanStore`], [`InMemoryHistoryStore`] - bundled implementations

mod file;
mod memory;

use async_trait::async_trait;
use taskflow_core::{ChatMessage, PlanVersion};

use crate::error::Result;

pub use file::FilePlanStore;
pub use memory::{InMemoryHistoryStore, MemoryPlanStore};

#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Highest version for the session, or `PlanNotFound`.
    async fn get_latest(&self, session_id: &str) -> Result<PlanVersion>;

    /// Append `content` as a new version and return its number.
    async fn append_version(&self, session_id: &str, content: &str) -> Result<u32>;

    /// Every version, oldest first. Empty when none exist.
    async fn history(&self, session_id: &str) -> Result<Vec<PlanVersion>>;
}

#[async_trait]
pub trait MessageHistoryStore: Send + Sync {
    /// Up to `limit` most recent messages, oldest first.
    async fn get_recent(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;

    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<()>;
}
