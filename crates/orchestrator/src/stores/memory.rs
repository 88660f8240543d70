use std::collections::HashMap;

use async_trait::async_trait;
use taskflow_core::{ChatMessage, PlanVersion};
use tokio::sync::RwLock;
use tracing::debug;

use super::{MessageHistoryStore, PlanStore};
use crate::error::{OrchestratorError, Result};

/// Plan store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryPlanStore {
    plans: RwLock<HashMap<String, Vec<PlanVersion>>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for MemoryPlanStore {
    async fn get_latest(&self, session_id: &str) -> Result<PlanVersion> {
        self.plans
            .read()
            .await
            .get(session_id)
            .and_then(|versions| versions.last().cloned())
            .ok_or_else(|| OrchestratorError::PlanNotFound(session_id.to_string()))
    }

    async fn append_version(&self, session_id: &str, content: &str) -> Result<u32> {
        let mut plans = self.plans.write().await;
        let versions = plans.entry(session_id.to_string()).or_default();
        let version = versions.last().map(|v| v.version).unwrap_or(0) + 1;
        versions.push(PlanVersion::new(session_id, version, content));

        debug!(session_id = %session_id, version, "Stored plan version in memory");
        Ok(version)
    }

    async fn history(&self, session_id: &str) -> Result<Vec<PlanVersion>> {
        Ok(self
            .plans
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Conversation history kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    messages: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageHistoryStore for InMemoryHistoryStore {
    async fn get_recent(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let messages = self.messages.read().await;
        let Some(all) = messages.get(session_id) else {
            return Ok(Vec::new());
        };
        let start = all.len().saturating_sub(limit);
        Ok(all[start..].to_vec())
    }

    async fn append(&self, session_id: &str, message: ChatMessage) -> Result<()> {
        self.messages
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_versions_increase_by_one() {
        let store = MemoryPlanStore::new();

        assert!(matches!(
            store.get_latest("s1").await,
            Err(OrchestratorError::PlanNotFound(_))
        ));

        assert_eq!(store.append_version("s1", "- [ ] 1. a").await.unwrap(), 1);
        assert_eq!(store.append_version("s1", "- [x] 1. a").await.unwrap(), 2);
        assert_eq!(store.append_version("s2", "- [ ] 1. b").await.unwrap(), 1);

        let latest = store.get_latest("s1").await.unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.content, "- [x] 1. a");

        let history = store.history("s1").await.unwrap();
        assert_eq!(
            history.iter().map(|v| v.version).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(store.history("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_store_recent() {
        let store = InMemoryHistoryStore::new();
        for i in 0..5 {
            store
                .append("s1", ChatMessage::user(format!("m{i}")))
                .await
                .unwrap();
        }

        let recent = store.get_recent("s1", 2).await.unwrap();
        assert_eq!(recent[0].content, "m3");
        assert_eq!(recent[1].content, "m4");
        assert_eq!(store.get_recent("s1", 50).await.unwrap().len(), 5);
        assert!(store.get_recent("other", 5).await.unwrap().is_empty());
    }
}
