//! Per-run progress bus built on a bounded tokio mpsc channel

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::types::ProgressEvent;

/// Capacity for a run's progress channel
pub const DEFAULT_CAPACITY: usize = 100;

/// Upper bound on the wait for delivering the terminal event
pub const TERMINAL_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a sender/stream pair with the given buffer capacity.
pub fn channel(capacity: usize) -> (ProgressSender, ProgressStream) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        ProgressSender {
            sender,
            capacity: capacity.max(1),
            sequence: AtomicU64::new(0),
            sent: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        },
        ProgressStream { receiver },
    )
}

/// Producer half of a run's progress bus.
///
/// `send` never waits: when the buffer is full the event is dropped and
/// counted. The channel closes when the sender is consumed by `finish`,
/// which is the only way to emit a terminal event. Gaps in `sequence`
/// tell the listener that events were dropped.
pub struct ProgressSender {
    sender: mpsc::Sender<ProgressEvent>,
    capacity: usize,
    sequence: AtomicU64,
    sent: AtomicUsize,
    dropped: AtomicUsize,
}

impl ProgressSender {
    /// Publish a non-terminal event without blocking.
    ///
    /// Returns whether the event was buffered.
    pub fn send(&self, mut event: ProgressEvent) -> bool {
        if event.is_terminal() {
            warn!(
                kind = event.kind.as_str(),
                label = %event.label,
                "Terminal events must be emitted through finish, ignoring"
            );
            return false;
        }

        event.sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        match self.sender.try_send(event) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    kind = event.kind.as_str(),
                    label = %event.label,
                    sequence = event.sequence,
                    capacity = self.capacity,
                    "Progress buffer full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(
                    kind = event.kind.as_str(),
                    "Progress listener gone, discarding event"
                );
                false
            }
        }
    }

    /// Emit the terminal event and close the channel.
    ///
    /// Consumes the sender so the channel is closed exactly once. The
    /// terminal event waits for buffer space for at most
    /// [`TERMINAL_SEND_TIMEOUT`].
    pub async fn finish(self, mut event: ProgressEvent) -> bool {
        if !event.is_terminal() {
            warn!(
                kind = event.kind.as_str(),
                "finish called with a non-terminal event"
            );
        }

        event.sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        match tokio::time::timeout(TERMINAL_SEND_TIMEOUT, self.sender.send(event)).await {
            Ok(Ok(())) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(Err(_)) => {
                debug!("Progress listener gone before terminal event");
                false
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    timeout_ms = TERMINAL_SEND_TIMEOUT.as_millis() as u64,
                    "Timed out delivering terminal event"
                );
                false
            }
        }
    }

    /// Number of events buffered so far
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }

    /// Number of events dropped because the buffer was full
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the listener has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender")
            .field("capacity", &self.capacity)
            .field("sent", &self.sent_count())
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

/// Consumer half of a run's progress bus.
///
/// Yields events until the producer finishes the run.
#[derive(Debug)]
pub struct ProgressStream {
    receiver: mpsc::Receiver<ProgressEvent>,
}

impl ProgressStream {
    /// Receive the next event; `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Drain the stream until the channel closes.
    pub async fn collect_all(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
