//! # Event Bus System
//!
//! Typed, broadcast-based notifications between the engine's components and
//! the host application.
//!
//! ## Overview
//!
//! ```text
//! ┌──────────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Orchestrator ├────────>│           ├────────────>│ Host UI    │
//! └──────────────┘         │ EventBus  │             └────────────┘
//! ┌──────────────┐  emit   │ (broadcast│  subscribe  ┌────────────┐
//! │ Connectivity ├────────>│  channel) ├────────────>│ Diagnostics│
//! └──────────────┘         └───────────┘             └────────────┘
//! ```
//!
//! Events are informational. Emitting never fails the operation that emits,
//! and a bus with no subscribers simply drops them.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, NetworkEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Network(NetworkEvent::Online { at_ms: 0 })).ok();
//! assert!(matches!(rx.recv().await, Ok(CoreEvent::Network(_))));
//! # }
//! ```
//!
//! ## Lagging
//!
//! A subscriber that falls more than `capacity` events behind receives
//! `RecvError::Lagged(n)` and can keep reading. `RecvError::Closed` means
//! every sender is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Content(ContentEvent),
    Cache(CacheEvent),
    Network(NetworkEvent),
    Progress(ProgressEvent),
    Settings(SettingsEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Content(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Network(e) => e.description(),
            CoreEvent::Progress(e) => e.description(),
            CoreEvent::Settings(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Content(ContentEvent::FetchFailed { .. })
            | CoreEvent::Progress(ProgressEvent::PersistFailed { .. })
            | CoreEvent::Settings(SettingsEvent::PersistFailed { .. }) => EventSeverity::Error,
            CoreEvent::Content(ContentEvent::Quarantined { .. })
            | CoreEvent::Content(ContentEvent::Unavailable { .. }) => EventSeverity::Warning,
            CoreEvent::Network(_)
            | CoreEvent::Content(ContentEvent::Fetched { .. })
            | CoreEvent::Progress(ProgressEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Content Events
// ============================================================================

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedFrom {
    Cache,
    Store,
    Remote,
}

/// Events emitted while resolving content reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ContentEvent {
    /// A read completed with a value.
    Resolved {
        content_id: String,
        source: ResolvedFrom,
        version: i64,
    },
    /// The remote source delivered a content item.
    Fetched {
        content_id: String,
        version: i64,
        attempts: u32,
    },
    /// The item is missing or stale and the device is offline.
    Unavailable { content_id: String },
    /// The remote fetch failed after retries, or permanently.
    FetchFailed {
        content_id: String,
        message: String,
        retryable: bool,
        attempts: u32,
    },
    /// A newer version was written through to the persistent store.
    Stored { content_id: String, version: i64 },
    /// A record failed integrity checks and was moved aside.
    Quarantined {
        entity_id: String,
        entity_kind: String,
        reason: String,
    },
    /// The content index was refreshed from the remote source.
    IndexRefreshed { entries: usize },
}

impl ContentEvent {
    fn description(&self) -> &str {
        match self {
            ContentEvent::Resolved { .. } => "Content resolved",
            ContentEvent::Fetched { .. } => "Content fetched from remote",
            ContentEvent::Unavailable { .. } => "Content unavailable offline",
            ContentEvent::FetchFailed { .. } => "Content fetch failed",
            ContentEvent::Stored { .. } => "Content stored",
            ContentEvent::Quarantined { .. } => "Corrupt record quarantined",
            ContentEvent::IndexRefreshed { .. } => "Content index refreshed",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Events about the in-memory cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// Entries matching `prefix` were dropped.
    Invalidated { prefix: String, removed: usize },
    /// A background revalidation was started for a stale key.
    RevalidationScheduled { key: String },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::Invalidated { .. } => "Cache entries invalidated",
            CacheEvent::RevalidationScheduled { .. } => "Background revalidation scheduled",
        }
    }
}

// ============================================================================
// Network Events
// ============================================================================

/// Debounced connectivity transitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum NetworkEvent {
    /// Transitioned to online (Unix epoch milliseconds).
    Online { at_ms: i64 },
    /// Transitioned to offline (Unix epoch milliseconds).
    Offline { at_ms: i64 },
    /// Stale subscribed keys were revalidated after reconnecting.
    ReconnectSweep { revalidated: usize },
}

impl NetworkEvent {
    fn description(&self) -> &str {
        match self {
            NetworkEvent::Online { .. } => "Network online",
            NetworkEvent::Offline { .. } => "Network offline",
            NetworkEvent::ReconnectSweep { .. } => "Reconnect sweep finished",
        }
    }
}

// ============================================================================
// Progress Events
// ============================================================================

/// Learner progress updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ProgressEvent {
    Updated {
        content_id: String,
        unit_id: String,
        completed_units: usize,
        status: String,
    },
    Completed { content_id: String },
    /// The durable write failed; the in-memory record is still current.
    PersistFailed { content_id: String, message: String },
}

impl ProgressEvent {
    fn description(&self) -> &str {
        match self {
            ProgressEvent::Updated { .. } => "Progress updated",
            ProgressEvent::Completed { .. } => "Content completed",
            ProgressEvent::PersistFailed { .. } => "Progress persistence failed",
        }
    }
}

// ============================================================================
// Settings Events
// ============================================================================

/// Global state changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SettingsEvent {
    Changed { key: String, value: String },
    SelectionChanged { content_id: Option<String> },
    PersistFailed { message: String },
}

impl SettingsEvent {
    fn description(&self) -> &str {
        match self {
            SettingsEvent::Changed { .. } => "Setting changed",
            SettingsEvent::SelectionChanged { .. } => "Selection changed",
            SettingsEvent::PersistFailed { .. } => "State persistence failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning is cheap and every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus that buffers up to `capacity` events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers reached, or an error when there are
    /// none. Callers that do not care use `.ok()`.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a receiver for all future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Creates a filtered stream for all future events.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

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

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity};
///
/// let bus = EventBus::default();
/// let errors = bus
///     .stream()
///     .filter(|event| event.severity() >= EventSeverity::Error);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once all senders are dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive; `None` when nothing matching is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Some(Err(RecvError::Closed))
                }
            }
        }
    }
}
