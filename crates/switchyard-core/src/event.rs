//! Event types for Switchyard.
//!
//! Any payload that can name the peripheral that produced it is an event.
//! Events travel through the router as [`EventRef`] so a single event can be
//! fanned out to several sinks without copying the payload.

use bytes::Bytes;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier used by events the core emits itself.
pub const CORE_IDENTIFIER: &str = "core";

/// A routable event.
pub trait Event: fmt::Debug + Send + Sync + 'static {
    /// Identifier of the peripheral that produced the event.
    fn source_id(&self) -> &str;

    /// Access the concrete event for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to an event.
pub type EventRef = Arc<dyn Event>;

impl dyn Event {
    /// Downcast to a concrete event type.
    #[must_use]
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Check whether the event is of type `T`.
    #[must_use]
    pub fn is<T: Event>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A unique message identifier.
pub type MessageId = u64;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

/// Generate a unique message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    (now_nanos() as u64).wrapping_add(counter)
}

/// General-purpose event: an opaque payload stamped with its source.
#[derive(Debug, Clone)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// Identifier of the producing peripheral.
    source: String,
    /// Optional event name.
    pub event: Option<String>,
    /// Message payload.
    pub payload: Bytes,
    /// Creation time in milliseconds since the epoch.
    pub timestamp: u64,
}

impl Message {
    /// Create a new message from `source`.
    #[must_use]
    pub fn new(source: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: generate_message_id(),
            source: source.into(),
            event: None,
            payload: payload.into(),
            timestamp: (now_nanos() / 1_000_000) as u64,
        }
    }

    /// Attach an event name.
    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Copy of this message re-stamped with another source.
    ///
    /// The copy gets a fresh id; the payload buffer is shared.
    #[must_use]
    pub fn forwarded_by(&self, source: impl Into<String>) -> Self {
        Self {
            id: generate_message_id(),
            source: source.into(),
            event: self.event.clone(),
            payload: self.payload.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Payload as UTF-8, if it is valid.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Wrap into a shared event handle.
    #[must_use]
    pub fn into_ref(self) -> EventRef {
        Arc::new(self)
    }
}

impl Event for Message {
    fn source_id(&self) -> &str {
        &self.source
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Category of a [`CoreEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreEventKind {
    /// Lifecycle update from the core.
    CoreUpdate,
}

/// Status carried by a [`CoreEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreStatus {
    /// Every configured peripheral has been constructed and registered.
    PeripheralsLoaded,
}

/// Notification emitted by the core itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreEvent {
    pub kind: CoreEventKind,
    pub status: CoreStatus,
}

impl CoreEvent {
    #[must_use]
    pub fn new(kind: CoreEventKind, status: CoreStatus) -> Self {
        Self { kind, status }
    }

    /// The event sent once all peripherals are loaded.
    #[must_use]
    pub fn peripherals_loaded() -> Self {
        Self::new(CoreEventKind::CoreUpdate, CoreStatus::PeripheralsLoaded)
    }
}

impl Event for CoreEvent {
    fn source_id(&self) -> &str {
        CORE_IDENTIFIER
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
