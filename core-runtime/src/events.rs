//! # Event Bus System
//!
//! Broadcasts typed [`StrmEvent`]s between the sync engines, the life monitor
//! and whatever host is listening, using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! [`StrmEvent`] covers sync runs, individual pointer writes and life monitor
//! state changes.
//!
//! Publishers never depend on anyone listening: emitting with no subscribers
//! returns an error that callers discard with `.ok()`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, StrmEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(StrmEvent::PointerWritten {
//!         local_path: "/strm/Show/S01E01.strm".to_string(),
//!     })
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Which engine produced a sync event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Full,
    Share,
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncKind::Full => f.write_str("full"),
            SyncKind::Share => f.write_str("share"),
        }
    }
}

/// Counters reported at the end of a sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Pointer files created or overwritten
    pub written: u64,
    /// Pointer files that already held the same URL
    pub unchanged: u64,
    /// Leaves skipped (extension, missing or malformed pickcode)
    pub skipped: u64,
    /// Writes that failed, plus mappings whose root could not be resolved
    pub failed: u64,
    pub duration_ms: u64,
}

impl SyncSummary {
    /// Leaves the run attempted to turn into pointer files
    pub fn attempted(&self) -> u64 {
        self.written + self.unchanged + self.skipped + self.failed
    }
}

/// Events published by the STRM engines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StrmEvent {
    /// A full or share sync run started.
    SyncStarted { run_id: String, kind: SyncKind },
    /// Running totals for an in-flight sync run.
    SyncProgress {
        run_id: String,
        written: u64,
        skipped: u64,
        failed: u64,
    },
    /// A sync run visited everything it could reach.
    SyncCompleted { run_id: String, summary: SyncSummary },
    /// A sync run could not start or was aborted.
    SyncFailed { run_id: String, message: String },
    /// A single pointer file was written outside of a batch run.
    PointerWritten { local_path: String },
    /// The life monitor loop started polling.
    MonitorStarted,
    /// The life monitor loop exited.
    MonitorStopped { reason: String },
}

/// Central event bus for publishing and subscribing to events.
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StrmEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: StrmEvent) -> Result<usize, SendError<StrmEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<StrmEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
