//! Run-scoped event emitter.
//!
//! Tags every event with the run and session it belongs to before it goes
//! onto the progress bus. Sequence numbers are assigned by the bus.

use events::{ProgressEvent, ProgressSender};
use uuid::Uuid;

#[derive(Clone, Copy)]
pub struct RunEmitter<'a> {
    sender: &'a ProgressSender,
    run_id: Uuid,
    session_id: &'a str,
}

impl<'a> RunEmitter<'a> {
    pub fn new(sender: &'a ProgressSender, run_id: Uuid, session_id: &'a str) -> Self {
        Self {
            sender,
            run_id,
            session_id,
        }
    }

    /// Publish a non-terminal event. Returns false if it was dropped.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        self.sender.send(self.tag(event))
    }

    pub fn start(&self, label: &str, message: impl Into<String>) -> bool {
        self.emit(ProgressEvent::start(label, message))
    }

    pub fn complete(&self, label: &str, message: impl Into<String>) -> bool {
        self.emit(ProgressEvent::complete(label, message))
    }

    pub fn result_chunk(&self, label: &str, content_type: &str, content: impl Into<String>) -> bool {
        self.emit(ProgressEvent::result_chunk(label, "assistant", content_type, content))
    }

    /// Add run identifiers to an event, e.g. a terminal one.
    pub fn tag(&self, event: ProgressEvent) -> ProgressEvent {
        event
            .with_payload("run_id", self.run_id.to_string())
            .with_payload("session_id", self.session_id)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn dropped_count(&self) -> usize {
        self.sender.dropped_count()
    }
}

impl std::fmt::Debug for RunEmitter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunEmitter")
            .field("run_id", &self.run_id)
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::{channel, EventKind};

    #[tokio::test]
    async fn test_events_are_tagged_and_sequenced() {
        let (tx, rx) = channel(8);
        let run_id = Uuid::new_v4();
        let emitter = RunEmitter::new(&tx, run_id, "s1");

        assert!(emitter.start("planner", "Planning"));
        assert!(emitter.result_chunk("summarizer", "summary", "All done"));
        drop(tx);

        let events = rx.collect_all().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 0);
        assert_eq!(events[1].sequence, 1);
        assert_eq!(events[1].kind, EventKind::ResultChunk);
        assert_eq!(events[1].payload_str("role"), Some("assistant"));

        let run_id = run_id.to_string();
        for event in &events {
            assert_eq!(event.payload_str("run_id"), Some(run_id.as_str()));
            assert_eq!(event.payload_str("session_id"), Some("s1"));
        }
    }
}
