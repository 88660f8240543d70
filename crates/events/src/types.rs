//! Event types for the taskflow progress stream

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Kind of a progress event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A phase started
    Start,
    /// A phase finished
    Complete,
    /// The run failed; terminal
    Error,
    /// A piece of result content
    ResultChunk,
    /// The run finished; terminal
    Done,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::ResultChunk => "result_chunk",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// One unit of a run's observable output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ProgressEvent {
    /// Unique event ID
    pub id: Uuid,
    /// Position in the run's stream, assigned by the sender
    pub sequence: u64,
    pub kind: EventKind,
    /// Phase label (planner, scanner, executor, ...)
    pub label: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    #[cfg_attr(feature = "typescript", ts(type = "Record<string, unknown>"))]
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// Create a new event with auto-generated ID and timestamp
    pub fn new(kind: EventKind, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            kind,
            label: label.into(),
            message: message.into(),
            timestamp: Utc::now(),
            payload: Map::new(),
            error: None,
        }
    }

    pub fn start(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventKind::Start, label, message)
    }

    pub fn complete(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventKind::Complete, label, message)
    }

    pub fn error(label: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            error: Some(error.clone()),
            ..Self::new(EventKind::Error, label, error)
        }
    }

    /// Result content tagged with the producing role and content type
    pub fn result_chunk(
        label: impl Into<String>,
        role: &str,
        content_type: &str,
        content: impl Into<String>,
    ) -> Self {
        Self::new(EventKind::ResultChunk, label, content)
            .with_payload("role", role)
            .with_payload("type", content_type)
    }

    pub fn done(message: impl Into<String>) -> Self {
        Self::new(EventKind::Done, "runner", message)
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Payload string field, if present
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = ProgressEvent::start("planner", "Planning");

        assert!(!event.id.is_nil());
        assert!(event.timestamp <= Utc::now());
        assert_eq!(event.kind, EventKind::Start);
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_error_event_carries_text() {
        let event = ProgressEvent::error("executor", "model unavailable");
        assert_eq!(event.error.as_deref(), Some("model unavailable"));
        assert!(event.is_terminal());
    }

    #[test]
    fn test_result_chunk_payload() {
        let event = ProgressEvent::result_chunk("summarizer", "assistant", "summary", "All done");
        assert_eq!(event.payload_str("role"), Some("assistant"));
        assert_eq!(event.payload_str("type"), Some("summary"));
        assert_eq!(event.message, "All done");
    }

    #[test]
    fn test_event_serialization() {
        let event = ProgressEvent::complete("scanner", "Next task").with_payload("task_key", "2");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""kind":"complete""#));
        assert!(json.contains(r#""task_key":"2""#));
        assert!(!json.contains(r#""error""#));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"id":"550e8400-e29b-41d4-a716-446655440000","sequence":4,"kind":"done","label":"runner","message":"ok","timestamp":"2026-01-01T00:00:00Z"}"#;
        let event: ProgressEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.kind, EventKind::Done);
        assert_eq!(event.sequence, 4);
        assert!(event.payload.is_empty());
    }
}
