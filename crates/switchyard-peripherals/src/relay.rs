//! Relay: a source and sink in one.
//!
//! Every accepted [`Message`] is re-emitted under the relay's own
//! identifier, so routes can chain through it. Core notifications are
//! consumed; any other event type is rejected.

use crate::config;
use async_trait::async_trait;
use serde::Deserialize;
use std::any::Any;
use std::sync::Arc;
use switchyard_core::factory::downcast_options;
use switchyard_core::{
    BaseOptions, CoreEvent, DeliveryError, EventRef, EventStream, FactoryError, LogSink, Message,
    Outbox, Peripheral, PeripheralFactory, PeripheralId, PeripheralOptions, Sink, Source,
};
use tokio::sync::mpsc;
use tracing::debug;

/// Kind tag of [`RelayFactory`].
pub const KIND: &str = "relay";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    /// Capacity of the outbound buffer.
    pub buffer: usize,
    /// Replace the event name of relayed messages.
    pub rename_event: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer: 16,
            rename_event: None,
        }
    }
}

pub struct Relay {
    id: PeripheralId,
    config: RelayConfig,
    log: LogSink,
    tx: mpsc::Sender<EventRef>,
    outbox: Outbox,
}

impl Relay {
    #[must_use]
    pub fn new(id: impl Into<PeripheralId>, config: RelayConfig, log: LogSink) -> Self {
        let (tx, outbox) = Outbox::channel(config.buffer.max(1));
        Self {
            id: id.into(),
            config,
            log,
            tx,
            outbox,
        }
    }

    fn relayed(&self, msg: &Message) -> Message {
        let copy = msg.forwarded_by(self.id.as_str());
        match &self.config.rename_event {
            Some(name) => copy.with_event(name.clone()),
            None => copy,
        }
    }
}

impl Peripheral for Relay {
    fn id(&self) -> &PeripheralId {
        &self.id
    }

    fn source(&self) -> Option<&dyn Source> {
        Some(self)
    }

    fn sink(&self) -> Option<&dyn Sink> {
        Some(self)
    }
}

impl Source for Relay {
    fn events(&self) -> Option<EventStream> {
        self.outbox.take()
    }
}

#[async_trait]
impl Sink for Relay {
    /// Waits while the outbound buffer is full.
    async fn accept(&self, event: EventRef) -> Result<(), DeliveryError> {
        if event.is::<CoreEvent>() {
            self.log
                .in_scope(|| debug!(peripheral = %self.id, event = ?event, "Core event consumed"));
            return Ok(());
        }

        let Some(msg) = event.downcast_ref::<Message>() else {
            return Err(DeliveryError::Rejected {
                peripheral: self.id.clone(),
                reason: "relay only forwards messages".to_string(),
            });
        };

        self.tx
            .send(self.relayed(msg).into_ref())
            .await
            .map_err(|_| DeliveryError::Closed(self.id.clone()))
    }
}

/// Options for [`RelayFactory`].
#[derive(Default)]
pub struct RelayOptions {
    base: BaseOptions,
}

impl PeripheralOptions for RelayOptions {
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

/// Builds [`Relay`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayFactory;

impl PeripheralFactory for RelayFactory {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn new_options(&self) -> Box<dyn PeripheralOptions> {
        Box::<RelayOptions>::default()
    }

    fn new_peripheral(
        &self,
        options: Box<dyn PeripheralOptions>,
    ) -> Result<Arc<dyn Peripheral>, FactoryError> {
        let options: RelayOptions = downcast_options(options, KIND)?;
        let base = options.base.into_validated()?;
        let config: RelayConfig = config::load(base.config_path.as_deref())?;

        if config.buffer == 0 {
            return Err(FactoryError::Build {
                id: base.id,
                message: "buffer must be greater than zero".to_string(),
            });
        }

        Ok(Arc::new(Relay::new(base.id, config, base.log)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use switchyard_core::testing::message;
    use switchyard_core::Event;

    #[derive(Debug)]
    struct Opaque;

    impl Event for Opaque {
        fn source_id(&self) -> &str {
            "opaque"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn relay(config: RelayConfig) -> Relay {
        Relay::new("bridge", config, LogSink::disabled())
    }

    #[tokio::test]
    async fn test_reemits_under_own_id() {
        let relay = relay(RelayConfig::default());
        let mut events = relay.events().unwrap();

        let original = message("emirc", "hello");
        relay.accept(Arc::clone(&original)).await.unwrap();

        let ev = events.next().await.unwrap();
        assert_eq!(ev.source_id(), "bridge");
        let relayed = ev.downcast_ref::<Message>().unwrap();
        let original = original.downcast_ref::<Message>().unwrap();
        assert_eq!(relayed.text(), Some("hello"));
        assert_ne!(relayed.id, original.id);
    }

    #[tokio::test]
    async fn test_rename_event() {
        let relay = relay(RelayConfig {
            rename_event: Some("relayed".to_string()),
            ..RelayConfig::default()
        });
        let mut events = relay.events().unwrap();

        relay.accept(message("emirc", "hello")).await.unwrap();
        let ev = events.next().await.unwrap();
        assert_eq!(
            ev.downcast_ref::<Message>().unwrap().event.as_deref(),
            Some("relayed")
        );
    }

    #[tokio::test]
    async fn test_core_event_consumed() {
        let relay = relay(RelayConfig::default());
        relay
            .accept(Arc::new(CoreEvent::peripherals_loaded()))
            .await
            .unwrap();

        let mut events = relay.events().unwrap();
        relay.accept(message("emirc", "after")).await.unwrap();
        let ev = events.next().await.unwrap();
        assert_eq!(ev.downcast_ref::<Message>().unwrap().text(), Some("after"));
    }

    #[tokio::test]
    async fn test_rejects_foreign_events() {
        let relay = relay(RelayConfig::default());
        let err = relay.accept(Arc::new(Opaque)).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_closed_when_stream_dropped() {
        let relay = relay(RelayConfig::default());
        drop(relay.events().unwrap());

        let err = relay.accept(message("emirc", "lost")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Closed(id) if id.as_str() == "bridge"));
    }

    #[test]
    fn test_capabilities() {
        let relay = relay(RelayConfig::default());
        assert_eq!(relay.capabilities().to_string(), "source+sink");
        assert!(relay.events().is_some());
        assert!(relay.events().is_none());
    }
}
