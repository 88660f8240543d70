//! Progress events for taskflow runs
//!
//! This crate provides the per-run progress bus and the event types
//! streamed from a workflow run to its single listener.

mod bus;
mod types;

pub use bus::{channel, ProgressSender, ProgressStream, DEFAULT_CAPACITY, TERMINAL_SEND_TIMEOUT};
pub use types::*;
