//! # Event Bus System
//!
//! Broadcast channel for engine lifecycle notifications, built on
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! Card set *contents* reach consumers through the subscriber callbacks of the
//! card set manager. The event bus carries everything around them: mode
//! switches, summaries of adopted card sets, provider failures and engine
//! start/stop. Telemetry and UI badges listen here without holding card sets.
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐    subscribe    ┌────────────┐
//! │ CardSet      ├──────────────>│ EventBus  ├────────────────>│ Telemetry  │
//! │ Manager      │               │ (broadcast│                 └────────────┘
//! └──────────────┘               │  channel) │    subscribe    ┌────────────┐
//! ┌──────────────┐     emit      │           ├────────────────>│ Status bar │
//! │ Providers    ├──────────────>│           │                 └────────────┘
//! └──────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SelectionEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = bus.subscribe();
//!
//! bus.emit(CoreEvent::Selection(SelectionEvent::ModeChanged {
//!     from: None,
//!     to: "whole_store".to_string(),
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Selection(_)));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; keep reading.
//! - **`RecvError::Closed`**: every sender is gone; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Card set selection events
    Selection(SelectionEvent),
    /// Engine lifecycle events
    Engine(EngineEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Selection(e) => e.description(),
            CoreEvent::Engine(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Selection(SelectionEvent::ProviderFailed { .. }) => EventSeverity::Error,
            CoreEvent::Selection(SelectionEvent::ListenerFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Selection(SelectionEvent::ModeChanged { .. }) => EventSeverity::Info,
            CoreEvent::Engine(_) => EventSeverity::Info,
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
// Selection Events
// ============================================================================

/// Events describing what the card set manager did.
///
/// Modes are carried as their snake_case names so this crate stays free of
/// engine types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SelectionEvent {
    /// The active selection mode changed.
    ModeChanged {
        from: Option<String>,
        to: String,
    },
    /// A new card set was adopted and delivered to subscribers.
    CardSetUpdated {
        mode: String,
        /// Folder path or query text the set was computed from.
        source: Option<String>,
        entry_count: usize,
    },
    /// A provider operation failed and the previous card set was kept.
    ProviderFailed {
        mode: String,
        /// Operation that failed (e.g. "load_card_set").
        operation: String,
        message: String,
    },
    /// A subscriber callback panicked; remaining subscribers were still notified.
    ListenerFailed {
        subscription_id: u64,
        message: String,
    },
}

impl SelectionEvent {
    fn description(&self) -> &str {
        match self {
            SelectionEvent::ModeChanged { .. } => "Selection mode changed",
            SelectionEvent::CardSetUpdated { .. } => "Card set updated",
            SelectionEvent::ProviderFailed { .. } => "Selection provider failed",
            SelectionEvent::ListenerFailed { .. } => "Card set subscriber failed",
        }
    }
}

// ============================================================================
// Engine Events
// ============================================================================

/// Engine lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum EngineEvent {
    /// Providers initialized and the file store watcher is running.
    Started { provider_count: usize },
    /// Providers cleaned up and subscribers released.
    Stopped,
}

impl EngineEvent {
    fn description(&self) -> &str {
        match self {
            EngineEvent::Started { .. } => "Card set engine started",
            EngineEvent::Stopped => "Card set engine stopped",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus yields another sender on the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers, or an error when nobody listens.
    /// Publishers in the engine ignore that error.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new receiver for all future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
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

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream};
///
/// let bus = EventBus::new(16);
/// let failures = EventStream::new(bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
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

    /// Only events matching `predicate` are returned by `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
