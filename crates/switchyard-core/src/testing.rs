//! Test peripherals.
//!
//! Available to this crate's tests and, with the `testing` feature, to
//! downstream crates.

use crate::event::{EventRef, Message};
use crate::factory::{
    downcast_options, BaseOptions, FactoryError, PeripheralFactory, PeripheralOptions,
};
use crate::peripheral::{DeliveryError, Inbox, Outbox, Peripheral, PeripheralId, Sink, Source};
use async_trait::async_trait;
use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Build a text [`Message`] event.
#[must_use]
pub fn message(source: &str, text: &str) -> EventRef {
    Message::new(source, text.to_string()).into_ref()
}

/// Source-only peripheral fed through an mpsc sender.
pub struct TestSource {
    id: PeripheralId,
    outbox: Outbox,
}

impl TestSource {
    /// Create the source and the sender that feeds it.
    #[must_use]
    pub fn new(id: &str, capacity: usize) -> (Self, mpsc::Sender<EventRef>) {
        let (tx, outbox) = Outbox::channel(capacity);
        (
            Self {
                id: PeripheralId::new(id),
                outbox,
            },
            tx,
        )
    }
}

impl Peripheral for TestSource {
    fn id(&self) -> &PeripheralId {
        &self.id
    }

    fn source(&self) -> Option<&dyn Source> {
        Some(&self.outbox)
    }
}

/// Sink-only peripheral that forwards accepted events to an mpsc receiver.
pub struct TestSink {
    id: PeripheralId,
    inbox: Inbox,
}

impl TestSink {
    /// Create the sink and the receiver observing it.
    #[must_use]
    pub fn new(id: &str, capacity: usize) -> (Self, mpsc::Receiver<EventRef>) {
        let (inbox, rx) = Inbox::channel(id, capacity);
        (
            Self {
                id: PeripheralId::new(id),
                inbox,
            },
            rx,
        )
    }
}

impl Peripheral for TestSink {
    fn id(&self) -> &PeripheralId {
        &self.id
    }

    fn sink(&self) -> Option<&dyn Sink> {
        Some(&self.inbox)
    }
}

/// Shared, ordered log of deliveries across several sinks.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<(PeripheralId, EventRef)>>>,
}

impl Journal {
    fn push(&self, destination: PeripheralId, event: EventRef) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((destination, event));
    }

    /// Every delivery so far, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<(PeripheralId, EventRef)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Destination of every delivery, oldest first.
    #[must_use]
    pub fn destinations(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .map(|(id, _)| id.as_str().to_string())
            .collect()
    }

    /// Text of every delivered [`Message`], oldest first.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.entries()
            .iter()
            .filter_map(|(_, ev)| ev.downcast_ref::<Message>())
            .filter_map(|m| m.text().map(str::to_string))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sink that records every accepted event in a [`Journal`].
pub struct JournalSink {
    id: PeripheralId,
    journal: Journal,
}

impl JournalSink {
    #[must_use]
    pub fn new(id: &str, journal: Journal) -> Self {
        Self {
            id: PeripheralId::new(id),
            journal,
        }
    }
}

impl Peripheral for JournalSink {
    fn id(&self) -> &PeripheralId {
        &self.id
    }

    fn sink(&self) -> Option<&dyn Sink> {
        Some(self)
    }
}

#[async_trait]
impl Sink for JournalSink {
    async fn accept(&self, event: EventRef) -> Result<(), DeliveryError> {
        self.journal.push(self.id.clone(), event);
        Ok(())
    }
}

/// Kind tag of [`TestSinkFactory`].
pub const TEST_SINK_KIND: &str = "test-sink";

/// Options for [`TestSinkFactory`].
#[derive(Default)]
pub struct TestSinkOptions {
    base: BaseOptions,
}

impl PeripheralOptions for TestSinkOptions {
    fn base(&self) -> &BaseOptions {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseOptions {
        &mut self.base
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Factory building [`JournalSink`]s that share one journal.
#[derive(Clone, Default)]
pub struct TestSinkFactory {
    pub journal: Journal,
}

impl PeripheralFactory for TestSinkFactory {
    fn kind(&self) -> &'static str {
        TEST_SINK_KIND
    }

    fn new_options(&self) -> Box<dyn PeripheralOptions> {
        Box::<TestSinkOptions>::default()
    }

    fn new_peripheral(
        &self,
        options: Box<dyn PeripheralOptions>,
    ) -> Result<Arc<dyn Peripheral>, FactoryError> {
        let options: TestSinkOptions = downcast_options(options, TEST_SINK_KIND)?;
        let base = options.base.into_validated()?;
        Ok(Arc::new(JournalSink {
            id: base.id,
            journal: self.journal.clone(),
        }))
    }
}
