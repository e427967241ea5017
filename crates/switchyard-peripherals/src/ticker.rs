//! Ticker source.
//!
//! Emits a text [`Message`] every `interval_ms`, optionally stopping after a
//! fixed number of ticks.

use crate::config;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::factory::downcast_options;
use switchyard_core::{
    BaseOptions, EventStream, FactoryError, LogSink, Message, Peripheral, PeripheralFactory,
    PeripheralId, PeripheralOptions, Source,
};
use tracing::{debug, trace};

/// Kind tag of [`TickerFactory`].
pub const KIND: &str = "ticker";

/// Ticker configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TickerConfig {
    /// Delay between ticks in milliseconds.
    pub interval_ms: u64,
    /// Payload prefix.
    pub text: String,
    /// Stop after this many ticks.
    pub limit: Option<u64>,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            text: "tick".to_string(),
            limit: None,
        }
    }
}

impl TickerConfig {
    fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Periodic message source.
pub struct Ticker {
    id: PeripheralId,
    config: TickerConfig,
    log: LogSink,
    started: AtomicBool,
}

impl Ticker {
    #[must_use]
    pub fn new(id: impl Into<PeripheralId>, config: TickerConfig, log: LogSink) -> Self {
        Self {
            id: id.into(),
            config,
            log,
            started: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TickerConfig {
        &self.config
    }
}

impl Peripheral for Ticker {
    fn id(&self) -> &PeripheralId {
        &self.id
    }

    fn source(&self) -> Option<&dyn Source> {
        Some(self)
    }
}

impl Source for Ticker {
    /// Only the first call yields a stream.
    fn events(&self) -> Option<EventStream> {
        if self.started.swap(true, Ordering::AcqRel) {
            return None;
        }

        self.log.in_scope(|| {
            debug!(
                peripheral = %self.id,
                interval_ms = self.config.interval_ms,
                limit = ?self.config.limit,
                "Ticker started"
            );
        });

        let id = self.id.as_str().to_string();
        let text = self.config.text.clone();
        let interval = self.config.interval();
        let limit = self.config.limit;
        let log = self.log.clone();

        let ticks = stream::unfold(0u64, move |seq| {
            let id = id.clone();
            let text = text.clone();
            let log = log.clone();
            async move {
                if limit.is_some_and(|limit| seq >= limit) {
                    return None;
                }
                tokio::time::sleep(interval).await;
                let seq = seq + 1;
                log.in_scope(|| trace!(peripheral = %id, seq, "Tick"));
                let message = Message::new(id, format!("{text} {seq}")).with_event("tick");
                Some((message.into_ref(), seq))
            }
        });

        Some(ticks.boxed())
    }
}

/// Options for [`TickerFactory`].
#[derive(Default)]
pub struct TickerOptions {
    base: BaseOptions,
}

impl PeripheralOptions for TickerOptions {
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

/// Builds [`Ticker`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickerFactory;

impl PeripheralFactory for TickerFactory {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn new_options(&self) -> Box<dyn PeripheralOptions> {
        Box::<TickerOptions>::default()
    }

    fn new_peripheral(
        &self,
        options: Box<dyn PeripheralOptions>,
    ) -> Result<Arc<dyn Peripheral>, FactoryError> {
        let options: TickerOptions = downcast_options(options, KIND)?;
        let base = options.base.into_validated()?;
        let config: TickerConfig = config::load(base.config_path.as_deref())?;

        if config.interval_ms == 0 {
            return Err(FactoryError::Build {
                id: base.id,
                message: "interval_ms must be greater than zero".to_string(),
            });
        }

        Ok(Arc::new(Ticker::new(base.id, config, base.log)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{Event, Registry};
    use tracing::level_filters::LevelFilter;

    fn ticker(limit: Option<u64>) -> Ticker {
        let config = TickerConfig {
            interval_ms: 100,
            text: "ping".to_string(),
            limit,
        };
        Ticker::new("clock", config, LogSink::disabled())
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_until_limit() {
        let ticker = ticker(Some(3));
        let events: Vec<_> = ticker.events().unwrap().collect().await;

        assert_eq!(events.len(), 3);
        let texts: Vec<_> = events
            .iter()
            .map(|ev| {
                assert_eq!(ev.source_id(), "clock");
                let msg = ev.downcast_ref::<Message>().unwrap();
                assert_eq!(msg.event.as_deref(), Some("tick"));
                msg.text().unwrap().to_string()
            })
            .collect();
        assert_eq!(texts, vec!["ping 1", "ping 2", "ping 3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_interval() {
        let ticker = ticker(None);
        let mut events = ticker.events().unwrap();

        let start = tokio::time::Instant::now();
        events.next().await.unwrap();
        events.next().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_stream_taken_once() {
        let ticker = ticker(Some(1));
        assert!(ticker.events().is_some());
        assert!(ticker.events().is_none());
    }

    #[test]
    fn test_is_source_only() {
        let ticker = ticker(None);
        assert!(ticker.source().is_some());
        assert!(ticker.sink().is_none());
    }

    #[test]
    fn test_factory_uses_defaults_without_config() {
        let registry = Arc::new(Registry::new());
        let mut opts = TickerFactory.new_options();
        opts.identifier("clock").unwrap();
        opts.core(registry.handle()).unwrap();
        opts.logging(LogSink::disabled(), LevelFilter::OFF).unwrap();

        let peripheral = TickerFactory.new_peripheral(opts).unwrap();
        assert_eq!(peripheral.id().as_str(), "clock");
        assert!(peripheral.source().is_some());
    }

    #[test]
    fn test_factory_rejects_zero_interval() {
        let path = std::env::temp_dir().join(format!(
            "switchyard-ticker-zero-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "interval_ms = 0\n").unwrap();

        let registry = Arc::new(Registry::new());
        let mut opts = TickerFactory.new_options();
        opts.identifier("clock").unwrap();
        opts.core(registry.handle()).unwrap();
        opts.logging(LogSink::disabled(), LevelFilter::OFF).unwrap();
        opts.config_path(&path).unwrap();

        let result = TickerFactory.new_peripheral(opts);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(FactoryError::Build { .. })));
    }

    #[test]
    fn test_config_defaults() {
        let config: TickerConfig = toml::from_str("limit = 5").unwrap();
        assert_eq!(config.interval_ms, 1000);
        assert_eq!(config.text, "tick");
        assert_eq!(config.limit, Some(5));
    }
}
