//! Console sink: writes every accepted event to its log sink.

use crate::config;
use async_trait::async_trait;
use serde::Deserialize;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use switchyard_core::factory::downcast_options;
use switchyard_core::{
    BaseOptions, CoreEvent, DeliveryError, Event, EventRef, FactoryError, LogSink, Message,
    Peripheral, PeripheralFactory, PeripheralId, PeripheralOptions, Sink,
};
use tracing::{info, Level};

/// Kind tag of [`ConsoleFactory`].
pub const KIND: &str = "console";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Prepended to every line.
    pub prefix: Option<String>,
    /// Also print notifications from the core.
    pub show_core_events: bool,
}

/// Logging sink.
pub struct Console {
    id: PeripheralId,
    config: ConsoleConfig,
    log: LogSink,
    received: AtomicU64,
}

impl Console {
    #[must_use]
    pub fn new(id: impl Into<PeripheralId>, config: ConsoleConfig, log: LogSink) -> Self {
        Self {
            id: id.into(),
            config,
            log,
            received: AtomicU64::new(0),
        }
    }

    /// Number of events accepted so far.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    fn render(&self, event: &EventRef) -> Option<String> {
        let body = if let Some(msg) = event.downcast_ref::<Message>() {
            match (msg.event.as_deref(), msg.text()) {
                (Some(name), Some(text)) => format!("[{}] {name}: {text}", event.source_id()),
                (None, Some(text)) => format!("[{}] {text}", event.source_id()),
                (_, None) => format!("[{}] <{} bytes>", event.source_id(), msg.payload.len()),
            }
        } else if let Some(core) = event.downcast_ref::<CoreEvent>() {
            if !self.config.show_core_events {
                return None;
            }
            format!("[{}] {:?}", event.source_id(), core.status)
        } else {
            format!("[{}] {event:?}", event.source_id())
        };

        Some(match &self.config.prefix {
            Some(prefix) => format!("{prefix}{body}"),
            None => body,
        })
    }
}

impl Peripheral for Console {
    fn id(&self) -> &PeripheralId {
        &self.id
    }

    fn sink(&self) -> Option<&dyn Sink> {
        Some(self)
    }
}

#[async_trait]
impl Sink for Console {
    async fn accept(&self, event: EventRef) -> Result<(), DeliveryError> {
        self.received.fetch_add(1, Ordering::Relaxed);

        if !self.log.enabled(Level::INFO) {
            return Ok(());
        }
        if let Some(line) = self.render(&event) {
            self.log.in_scope(|| info!(peripheral = %self.id, "{line}"));
        }
        Ok(())
    }
}

/// Options for [`ConsoleFactory`].
#[derive(Default)]
pub struct ConsoleOptions {
    base: BaseOptions,
}

impl PeripheralOptions for ConsoleOptions {
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

/// Builds [`Console`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleFactory;

impl PeripheralFactory for ConsoleFactory {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn new_options(&self) -> Box<dyn PeripheralOptions> {
        Box::<ConsoleOptions>::default()
    }

    fn new_peripheral(
        &self,
        options: Box<dyn PeripheralOptions>,
    ) -> Result<Arc<dyn Peripheral>, FactoryError> {
        let options: ConsoleOptions = downcast_options(options, KIND)?;
        let base = options.base.into_validated()?;
        let config = config::load(base.config_path.as_deref())?;
        Ok(Arc::new(Console::new(base.id, config, base.log)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::testing::message;
    use switchyard_core::Registry;
    use tracing::level_filters::LevelFilter;

    fn console(config: ConsoleConfig) -> Console {
        Console::new("stdout", config, LogSink::current(LevelFilter::INFO))
    }

    #[tokio::test]
    async fn test_accepts_and_counts() {
        let console = console(ConsoleConfig::default());
        console.accept(message("emirc", "hello")).await.unwrap();
        console
            .accept(Arc::new(CoreEvent::peripherals_loaded()))
            .await
            .unwrap();
        assert_eq!(console.received(), 2);
    }

    #[test]
    fn test_render_message() {
        let console = console(ConsoleConfig {
            prefix: Some("> ".to_string()),
            ..ConsoleConfig::default()
        });
        let ev = Message::new("emirc", "hello").with_event("privmsg").into_ref();
        assert_eq!(
            console.render(&ev).as_deref(),
            Some("> [emirc] privmsg: hello")
        );

        let binary = Message::new("emirc", vec![0xff, 0xfe]).into_ref();
        assert_eq!(
            console.render(&binary).as_deref(),
            Some("> [emirc] <2 bytes>")
        );
    }

    #[test]
    fn test_core_events_hidden_by_default() {
        let core: EventRef = Arc::new(CoreEvent::peripherals_loaded());
        assert!(console(ConsoleConfig::default()).render(&core).is_none());

        let shown = console(ConsoleConfig {
            show_core_events: true,
            ..ConsoleConfig::default()
        });
        assert_eq!(
            shown.render(&core).as_deref(),
            Some("[core] PeripheralsLoaded")
        );
    }

    #[test]
    fn test_factory_builds_sink() {
        let registry = Arc::new(Registry::new());
        let mut opts = ConsoleFactory.new_options();
        opts.identifier("stdout").unwrap();
        opts.core(registry.handle()).unwrap();
        opts.logging(LogSink::disabled(), LevelFilter::OFF).unwrap();

        let peripheral = ConsoleFactory.new_peripheral(opts).unwrap();
        assert!(peripheral.sink().is_some());
        assert!(peripheral.source().is_none());
    }
}
