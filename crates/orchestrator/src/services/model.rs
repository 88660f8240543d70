//! Chat model seam.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use taskflow_core::ChatMessage;

use crate::error::Result;

/// Tool description handed to a model that supports tool calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ToolInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({ "type": "object" }),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

pub type MessageStream = Pin<Box<dyn Stream<Item = Result<ChatMessage>> + Send>>;

/// A language model. The system prompt is always the first message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<ChatMessage>;

    /// Stream the reply in chunks. Defaults to a single chunk.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<MessageStream> {
        let message = self.generate(messages).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(message) })))
    }

    /// A copy of this model that may request the given tools.
    ///
    /// `None` means the model has no tool support.
    fn bind_tools(&self, _tools: &[ToolInfo]) -> Option<Arc<dyn ChatModel>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Echo;

    #[async_trait]
    impl ChatModel for Echo {
        async fn generate(&self, messages: &[ChatMessage]) -> Result<ChatMessage> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ChatMessage::assistant(last))
        }
    }

    #[tokio::test]
    async fn test_default_stream_yields_one_chunk() {
        let chunks: Vec<_> = Echo
            .stream(&[ChatMessage::user("ping")])
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().content, "ping");
    }

    #[test]
    fn test_default_has_no_tool_support() {
        assert!(Echo.bind_tools(&[ToolInfo::new("search", "Search")]).is_none());
    }
}
