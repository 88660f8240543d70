//! Chat model that replays a fixed script of replies.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use taskflow_core::{ChatMessage, ToolCall};
use tokio::sync::Mutex;
use tracing::debug;

use super::model::{ChatModel, ToolInfo};
use crate::error::{OrchestratorError, Result};

/// One scripted reply.
///
/// In JSON either a plain string (assistant text) or an object with
/// `content`, `tool_calls` and an optional `error` that makes the call
/// fail with a model error.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScriptedReply {
    Text(String),
    Message {
        #[serde(default)]
        content: String,
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
        #[serde(default)]
        error: Option<String>,
    },
}

impl ScriptedReply {
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Message {
            content: String::new(),
            tool_calls: Vec::new(),
            error: Some(reason.into()),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::Message {
            content: String::new(),
            tool_calls: calls,
            error: None,
        }
    }

    fn into_message(self) -> Result<ChatMessage> {
        match self {
            Self::Text(text) => Ok(ChatMessage::assistant(text)),
            Self::Message {
                error: Some(reason),
                ..
            } => Err(OrchestratorError::model(reason)),
            Self::Message {
                content,
                tool_calls,
                ..
            } => Ok(ChatMessage::assistant_with_tools(content, tool_calls)),
        }
    }
}

impl From<&str> for ScriptedReply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ScriptedReply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<ScriptedReply>,
    requests: Vec<Vec<ChatMessage>>,
}

/// Replays replies in order and records every request it received.
///
/// Copies made through `bind_tools` share the same script. Once the
/// script runs out every call fails with a model error.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChatModel {
    script: Arc<Mutex<Script>>,
    tools: Vec<ToolInfo>,
}

impl ScriptedChatModel {
    pub fn new<I, R>(replies: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ScriptedReply>,
    {
        Self {
            script: Arc::new(Mutex::new(Script {
                replies: replies.into_iter().map(Into::into).collect(),
                requests: Vec::new(),
            })),
            tools: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let replies: Vec<ScriptedReply> = serde_json::from_str(json)?;
        Ok(Self::new(replies))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&json)
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.script.lock().await.requests.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.replies.len()
    }

    /// Tools bound to this copy.
    pub fn bound_tools(&self) -> &[ToolInfo] {
        &self.tools
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<ChatMessage> {
        let mut script = self.script.lock().await;
        script.requests.push(messages.to_vec());

        let reply = script
            .replies
            .pop_front()
            .ok_or_else(|| OrchestratorError::model("scripted model has no replies left"))?;
        debug!(
            remaining = script.replies.len(),
            tools = self.tools.len(),
            "Replaying scripted reply"
        );
        reply.into_message()
    }

    fn bind_tools(&self, tools: &[ToolInfo]) -> Option<Arc<dyn ChatModel>> {
        Some(Arc::new(Self {
            script: Arc::clone(&self.script),
            tools: tools.to_vec(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_then_fails() {
        let model = ScriptedChatModel::new(["first", "second"]);

        let reply = model.generate(&[ChatMessage::user("a")]).await.unwrap();
        assert_eq!(reply.content, "first");
        let reply = model.generate(&[ChatMessage::user("b")]).await.unwrap();
        assert_eq!(reply.content, "second");

        let err = model.generate(&[ChatMessage::user("c")]).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Model(_)));

        let requests = model.requests().await;
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1][0].content, "b");
    }

    #[tokio::test]
    async fn test_bound_copy_shares_script() {
        let model = ScriptedChatModel::new(["one", "two"]);
        let bound = model
            .bind_tools(&[ToolInfo::new("search", "Search")])
            .unwrap();

        assert_eq!(bound.generate(&[]).await.unwrap().content, "one");
        assert_eq!(model.generate(&[]).await.unwrap().content, "two");
        assert_eq!(model.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_from_json() {
        let model = ScriptedChatModel::from_json(
            r#"[
                "- [ ] 1. Search",
                {"tool_calls": [{"id": "c1", "name": "search", "arguments": {"q": "x"}}]},
                {"error": "rate limited"}
            ]"#,
        )
        .unwrap();

        assert_eq!(model.generate(&[]).await.unwrap().content, "- [ ] 1. Search");

        let reply = model.generate(&[]).await.unwrap();
        assert_eq!(reply.tool_calls[0].name, "search");

        let err = model.generate(&[]).await.unwrap_err();
        assert_eq!(err.to_string(), "Model error: rate limited");
    }

    #[tokio::test]
    async fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("script.json");
        tokio::fs::write(&path, r#"["hello"]"#).await.unwrap();

        let model = ScriptedChatModel::from_file(&path).await.unwrap();
        assert_eq!(model.generate(&[]).await.unwrap().content, "hello");

        assert!(ScriptedChatModel::from_json("{").is_err());
    }
}
