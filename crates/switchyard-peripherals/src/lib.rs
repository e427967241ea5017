//! # switchyard-peripherals
//!
//! Peripherals that ship with Switchyard:
//!
//! - **ticker** - Source emitting a message on a fixed interval
//! - **console** - Sink writing every event to the log
//! - **relay** - Source and sink re-emitting messages under its own identifier
//!
//! Each one comes with a [`PeripheralFactory`] registered under its kind tag.
//!
//! ```rust,ignore
//! use switchyard_peripherals::builtin_factories;
//!
//! let factories = builtin_factories()?;
//! let registry = switchyard_core::load_peripherals(&specs, &factories, &log).await?;
//! ```

pub mod config;

#[cfg(feature = "console")]
pub mod console;
#[cfg(feature = "relay")]
pub mod relay;
#[cfg(feature = "ticker")]
pub mod ticker;

#[cfg(feature = "console")]
pub use console::{Console, ConsoleFactory};
#[cfg(feature = "relay")]
pub use relay::{Relay, RelayFactory};
#[cfg(feature = "ticker")]
pub use ticker::{Ticker, TickerFactory};

use std::sync::Arc;
use switchyard_core::{FactoryError, FactoryTable, PeripheralFactory};

/// Factory table holding every built-in peripheral kind enabled at build time.
///
/// # Errors
///
/// Only fails if two built-ins share a kind tag.
#[allow(unused_mut)]
pub fn builtin_factories() -> Result<FactoryTable, FactoryError> {
    let mut table = FactoryTable::new();

    #[cfg(feature = "ticker")]
    table.register(Arc::new(TickerFactory))?;
    #[cfg(feature = "console")]
    table.register(Arc::new(ConsoleFactory))?;
    #[cfg(feature = "relay")]
    table.register(Arc::new(RelayFactory))?;

    Ok(table)
}

/// Register an additional factory next to the built-ins.
///
/// # Errors
///
/// Returns [`FactoryError::DuplicateKind`] if `factory` reuses a built-in tag.
pub fn with_builtins(factory: Arc<dyn PeripheralFactory>) -> Result<FactoryTable, FactoryError> {
    builtin_factories()?.with(factory)
}

#[cfg(all(test, feature = "ticker", feature = "console", feature = "relay"))]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use switchyard_core::testing::{Journal, TestSinkFactory, TEST_SINK_KIND};
    use switchyard_core::{
        load_peripherals, Event, LogSink, Message, PeripheralSpec, RouteDescriptor, Router,
        RouterConfig,
    };
    use tokio_util::sync::CancellationToken;

    fn spec(id: &str, kind: &str) -> PeripheralSpec {
        PeripheralSpec {
            identifier: id.to_string(),
            kind: kind.to_string(),
            config_path: None,
        }
    }

    #[test]
    fn test_builtin_kinds() {
        let table = builtin_factories().unwrap();
        assert_eq!(table.kinds(), vec!["console", "relay", "ticker"]);
    }

    #[test]
    fn test_with_builtins_rejects_duplicates() {
        assert!(matches!(
            with_builtins(Arc::new(TickerFactory)),
            Err(FactoryError::DuplicateKind(kind)) if kind == "ticker"
        ));
        let table = with_builtins(Arc::new(TestSinkFactory::default())).unwrap();
        assert_eq!(table.len(), 4);
    }

    #[tokio::test]
    async fn test_relay_chain_through_router() {
        let journal = Journal::default();
        let factories = with_builtins(Arc::new(TestSinkFactory {
            journal: journal.clone(),
        }))
        .unwrap();

        let specs = [
            spec("bridge", relay::KIND),
            spec("stdout", console::KIND),
            spec("archive", TEST_SINK_KIND),
        ];
        let registry = load_peripherals(&specs, &factories, &LogSink::disabled())
            .await
            .unwrap();

        // Only the journal sink keeps the load notification.
        assert_eq!(journal.len(), 1);

        let router = Router::new(
            Arc::clone(&registry),
            [RouteDescriptor::new("bridge", ["stdout", "archive"])],
            RouterConfig::default(),
        )
        .unwrap();

        let bridge = registry.lookup("bridge").unwrap();
        let sink = bridge.sink().unwrap();
        sink.accept(Message::new("emirc", "hello").into_ref())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { router.run(cancel).await }
        });

        while journal.len() < 2 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        run.await.unwrap().unwrap();

        let entries = journal.entries();
        let (dest, ev) = &entries[1];
        assert_eq!(dest.as_str(), "archive");
        assert_eq!(ev.source_id(), "bridge");
        assert_eq!(journal.texts(), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_stream_is_finite_with_limit() {
        let ticker = ticker::Ticker::new(
            "clock",
            ticker::TickerConfig {
                interval_ms: 10,
                text: "t".to_string(),
                limit: Some(2),
            },
            LogSink::disabled(),
        );
        let source = switchyard_core::Peripheral::source(&ticker).unwrap();
        assert_eq!(source.events().unwrap().count().await, 2);
    }
}
