//! Tool registry seam.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use taskflow_core::{ChatMessage, ToolCall};
use tracing::{debug, warn};

use super::model::ToolInfo;

/// Tools the executor may call.
#[async_trait]
pub trait ToolSet: Send + Sync {
    fn infos(&self) -> Vec<ToolInfo>;

    /// Run one tool call. `Err` carries the failure text for the model.
    async fn invoke(&self, call: &ToolCall) -> Result<String, String>;

    /// Run every tool call of an assistant message, in order.
    ///
    /// Produces one tool message per call. Failures become tool messages
    /// with `is_error` set.
    async fn invoke_tool_calls(&self, message: &ChatMessage) -> Vec<ChatMessage> {
        let mut results = Vec::with_capacity(message.tool_calls.len());
        for call in &message.tool_calls {
            match self.invoke(call).await {
                Ok(output) => {
                    debug!(tool = %call.name, call_id = %call.id, "Tool call succeeded");
                    results.push(ChatMessage::tool_result(call, output));
                }
                Err(reason) => {
                    warn!(tool = %call.name, call_id = %call.id, error = %reason, "Tool call failed");
                    results.push(ChatMessage::tool_error(call, reason));
                }
            }
        }
        results
    }
}

/// The empty tool set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTools;

#[async_trait]
impl ToolSet for NoTools {
    fn infos(&self) -> Vec<ToolInfo> {
        Vec::new()
    }

    async fn invoke(&self, call: &ToolCall) -> Result<String, String> {
        Err(format!("Error: unknown tool {}", call.name))
    }
}

type ToolFn = Arc<dyn Fn(&Value) -> Result<String, String> + Send + Sync>;

/// Tool set backed by plain closures.
#[derive(Clone, Default)]
pub struct FnToolSet {
    tools: BTreeMap<String, (ToolInfo, ToolFn)>,
}

impl FnToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool<F>(mut self, info: ToolInfo, f: F) -> Self
    where
        F: Fn(&Value) -> Result<String, String> + Send + Sync + 'static,
    {
        self.tools.insert(info.name.clone(), (info, Arc::new(f)));
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for FnToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnToolSet")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ToolSet for FnToolSet {
    fn infos(&self) -> Vec<ToolInfo> {
        self.tools.values().map(|(info, _)| info.clone()).collect()
    }

    async fn invoke(&self, call: &ToolCall) -> Result<String, String> {
        match self.tools.get(&call.name) {
            Some((_, f)) => f(&call.arguments),
            None => Err(format!("Error: unknown tool {}", call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tools() -> FnToolSet {
        FnToolSet::new()
            .with_tool(ToolInfo::new("echo", "Echo the text argument"), |args| {
                Ok(args["text"].as_str().unwrap_or_default().to_string())
            })
            .with_tool(ToolInfo::new("broken", "Always fails"), |_| {
                Err("Error: backend unavailable".to_string())
            })
    }

    #[tokio::test]
    async fn test_invoke_tool_calls_keeps_order_and_errors() {
        let message = ChatMessage::assistant_with_tools(
            "",
            vec![
                ToolCall::new("c1", "echo", json!({"text": "hi"})),
                ToolCall::new("c2", "broken", json!({})),
                ToolCall::new("c3", "missing", json!({})),
            ],
        );

        let results = tools().invoke_tool_calls(&message).await;
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].content, "hi");
        assert!(!results[0].is_error);
        assert_eq!(results[0].tool_call_id.as_deref(), Some("c1"));

        assert!(results[1].is_error);
        assert_eq!(results[1].name.as_deref(), Some("broken"));

        assert!(results[2].is_error);
        assert!(results[2].content.contains("unknown tool missing"));
    }

    #[tokio::test]
    async fn test_no_tools() {
        assert!(NoTools.infos().is_empty());
        let message =
            ChatMessage::assistant_with_tools("", vec![ToolCall::new("c1", "x", json!({}))]);
        let results = NoTools.invoke_tool_calls(&message).await;
        assert!(results[0].is_error);
    }

    #[test]
    fn test_infos_sorted_by_name() {
        let names: Vec<_> = tools().infos().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["broken", "echo"]);
    }
}
