//! Capability model for Switchyard peripherals.
//!
//! A peripheral is always identifiable. On top of that it may be a
//! [`Source`] (it emits events), a [`Sink`] (it accepts events), both, or
//! neither. The router never assumes a capability: it asks each peripheral
//! through [`Peripheral::source`] and [`Peripheral::sink`].

use crate::event::EventRef;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;

/// Unique identifier of a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralId(String);

impl PeripheralId {
    /// Create a peripheral ID.
    ///
    /// Emptiness is checked where identifiers enter the system (factory
    /// options, route validation), not here.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PeripheralId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeripheralId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::borrow::Borrow<str> for PeripheralId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Stream of events produced by a source.
pub type EventStream = BoxStream<'static, EventRef>;

/// Delivery errors reported by a sink.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The sink's inbound side is gone.
    #[error("Sink closed: {0}")]
    Closed(PeripheralId),

    /// The sink refused the event.
    #[error("Event rejected by {peripheral}: {reason}")]
    Rejected {
        peripheral: PeripheralId,
        reason: String,
    },
}

/// A peripheral that emits events.
pub trait Source: Send + Sync {
    /// Hand out the outbound event stream.
    ///
    /// Returns `None` when the stream is unavailable, typically because it was
    /// already taken. Whether a second call yields a new stream is up to the
    /// peripheral.
    fn events(&self) -> Option<EventStream>;
}

/// A peripheral that accepts events.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Accept one event. May wait while the peripheral is busy.
    async fn accept(&self, event: EventRef) -> Result<(), DeliveryError>;
}

/// An identifiable component on the event bus.
pub trait Peripheral: Send + Sync {
    /// The peripheral's unique identifier.
    fn id(&self) -> &PeripheralId;

    /// Source capability, if present.
    fn source(&self) -> Option<&dyn Source> {
        None
    }

    /// Sink capability, if present.
    fn sink(&self) -> Option<&dyn Sink> {
        None
    }

    /// Summary of the capability set.
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            source: self.source().is_some(),
            sink: self.sink().is_some(),
        }
    }
}

impl fmt::Debug for dyn Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peripheral")
            .field("id", self.id())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// Capability set of a peripheral, beyond identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub source: bool,
    pub sink: bool,
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.source, self.sink) {
            (true, true) => f.write_str("source+sink"),
            (true, false) => f.write_str("source"),
            (false, true) => f.write_str("sink"),
            (false, false) => f.write_str("none"),
        }
    }
}

/// Holder for a source's outbound stream backed by an mpsc channel.
///
/// The producing side keeps the sender; the stream can be taken once.
pub struct Outbox {
    receiver: Mutex<Option<mpsc::Receiver<EventRef>>>,
}

impl Outbox {
    /// Create an outbox and the sender feeding it.
    #[must_use]
    pub fn channel(capacity: usize) -> (mpsc::Sender<EventRef>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                receiver: Mutex::new(Some(rx)),
            },
        )
    }

    /// Take the stream. Subsequent calls return `None`.
    pub fn take(&self) -> Option<EventStream> {
        let rx = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(receiver_stream(rx))
    }

    /// Check whether the stream is still available.
    #[must_use]
    pub fn is_taken(&self) -> bool {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Source for Outbox {
    fn events(&self) -> Option<EventStream> {
        self.take()
    }
}

/// Turn an mpsc receiver into an [`EventStream`].
#[must_use]
pub fn receiver_stream(rx: mpsc::Receiver<EventRef>) -> EventStream {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|ev| (ev, rx)) }).boxed()
}

/// Sink acceptor backed by a bounded mpsc channel.
///
/// `accept` waits while the channel is full.
#[derive(Debug, Clone)]
pub struct Inbox {
    owner: PeripheralId,
    sender: mpsc::Sender<EventRef>,
}

impl Inbox {
    /// Create an inbox for `owner` and the receiver draining it.
    #[must_use]
    pub fn channel(
        owner: impl Into<PeripheralId>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<EventRef>) {
        let (sender, rx) = mpsc::channel(capacity);
        (
            Self {
                owner: owner.into(),
                sender,
            },
            rx,
        )
    }

    /// Identifier of the owning peripheral.
    #[must_use]
    pub fn owner(&self) -> &PeripheralId {
        &self.owner
    }
}

#[async_trait]
impl Sink for Inbox {
    async fn accept(&self, event: EventRef) -> Result<(), DeliveryError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| DeliveryError::Closed(self.owner.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Message;

    struct Plain(PeripheralId);

    impl Peripheral for Plain {
        fn id(&self) -> &PeripheralId {
            &self.0
        }
    }

    #[test]
    fn test_peripheral_id_from_string() {
        let id: PeripheralId = "emirc".into();
        assert_eq!(id.as_str(), "emirc");
        assert_eq!(id.to_string(), "emirc");
        assert!(!id.is_empty());
        assert!(PeripheralId::new("").is_empty());
    }

    #[test]
    fn test_default_capabilities_are_empty() {
        let p = Plain("plain".into());
        assert!(p.source().is_none());
        assert!(p.sink().is_none());
        assert_eq!(p.capabilities(), Capabilities::default());
        assert_eq!(p.capabilities().to_string(), "none");
    }

    #[tokio::test]
    async fn test_outbox_stream_taken_once() {
        let (tx, outbox) = Outbox::channel(4);
        let mut stream = outbox.events().unwrap();
        assert!(outbox.is_taken());
        assert!(outbox.events().is_none());

        tx.send(Message::new("emirc", "one").into_ref()).await.unwrap();
        drop(tx);

        let ev = stream.next().await.unwrap();
        assert_eq!(ev.source_id(), "emirc");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_inbox_reports_closed() {
        let (inbox, rx) = Inbox::channel("emi2t", 1);
        inbox.accept(Message::new("emirc", "a").into_ref()).await.unwrap();
        drop(rx);

        let err = inbox
            .accept(Message::new("emirc", "b").into_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Closed(id) if id.as_str() == "emi2t"));
    }
}
