//! Startup: build every configured peripheral and fill the registry.

use crate::event::{CoreEvent, EventRef};
use crate::factory::{FactoryError, FactoryTable};
use crate::logging::LogSink;
use crate::peripheral::Peripheral;
use crate::registry::{Registry, RegistryError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// One peripheral to instantiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralSpec {
    /// Unique identifier.
    pub identifier: String,
    /// Factory kind tag.
    pub kind: String,
    /// Implementation-specific configuration file.
    pub config_path: Option<PathBuf>,
}

/// Startup errors.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A factory refused to build a peripheral.
    #[error("Could not create peripheral \"{id}\" of kind \"{kind}\": {source}")]
    Factory {
        id: String,
        kind: String,
        source: FactoryError,
    },

    /// The peripheral could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Build and register every peripheral in `specs`, in order.
///
/// Once all are registered, every sink receives a
/// [`CoreEvent::peripherals_loaded`] notification. The returned registry is
/// not sealed yet.
///
/// # Errors
///
/// Stops at the first peripheral that cannot be built or registered.
pub async fn load_peripherals(
    specs: &[PeripheralSpec],
    factories: &FactoryTable,
    log: &LogSink,
) -> Result<Arc<Registry>, LoadError> {
    let registry = Arc::new(Registry::new());

    for spec in specs {
        debug!(peripheral = %spec.identifier, kind = %spec.kind, "Creating peripheral");
        let peripheral =
            build_peripheral(spec, factories, &registry, log).map_err(|source| {
                LoadError::Factory {
                    id: spec.identifier.clone(),
                    kind: spec.kind.clone(),
                    source,
                }
            })?;
        registry.register(peripheral)?;
    }

    info!(peripherals = registry.len(), "All peripherals loaded");
    announce(&registry, Arc::new(CoreEvent::peripherals_loaded())).await;

    Ok(registry)
}

fn build_peripheral(
    spec: &PeripheralSpec,
    factories: &FactoryTable,
    registry: &Arc<Registry>,
    log: &LogSink,
) -> Result<Arc<dyn Peripheral>, FactoryError> {
    let factory = factories.get(&spec.kind)?;

    let mut options = factory.new_options();
    options.identifier(&spec.identifier)?;
    options.core(registry.handle())?;
    options.logging(log.clone(), log.level())?;
    if let Some(path) = &spec.config_path {
        options.config_path(path)?;
    }
    options.validate()?;

    factory.new_peripheral(options)
}

/// Deliver `event` directly to every sink in the registry.
///
/// Delivery failures are logged and do not stop the broadcast.
pub async fn announce(registry: &Registry, event: EventRef) {
    let mut sinks: Vec<Arc<dyn Peripheral>> = Vec::new();
    registry
        .for_each(|peripheral| {
            if peripheral.sink().is_some() {
                sinks.push(Arc::clone(peripheral));
            }
            Ok::<(), std::convert::Infallible>(())
        })
        .unwrap_or_else(|never| match never {});

    for peripheral in sinks {
        if let Some(sink) = peripheral.sink() {
            if let Err(e) = sink.accept(Arc::clone(&event)).await {
                warn!(peripheral = %peripheral.id(), error = %e, "Core event not delivered");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CoreStatus;
    use crate::factory::ValidationError;
    use crate::testing::{TestSinkFactory, TEST_SINK_KIND};

    fn spec(id: &str, kind: &str) -> PeripheralSpec {
        PeripheralSpec {
            identifier: id.to_string(),
            kind: kind.to_string(),
            config_path: None,
        }
    }

    fn table(factory: &TestSinkFactory) -> FactoryTable {
        FactoryTable::new().with(Arc::new(factory.clone())).unwrap()
    }

    #[tokio::test]
    async fn test_load_and_announce() {
        let factory = TestSinkFactory::default();
        let specs = [spec("emi2t", TEST_SINK_KIND), spec("archive", TEST_SINK_KIND)];

        let registry = load_peripherals(&specs, &table(&factory), &LogSink::disabled())
            .await
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("emi2t").is_some());
        assert!(!registry.is_sealed());

        let entries = factory.journal.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|(_, ev)| {
            ev.downcast_ref::<CoreEvent>().map(|e| e.status) == Some(CoreStatus::PeripheralsLoaded)
        }));
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let factory = TestSinkFactory::default();
        let err = load_peripherals(&[spec("emirc", "irc")], &table(&factory), &LogSink::disabled())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoadError::Factory { ref id, source: FactoryError::UnknownKind(_), .. } if id == "emirc"
        ));
    }

    #[tokio::test]
    async fn test_empty_identifier() {
        let factory = TestSinkFactory::default();
        let err = load_peripherals(&[spec("", TEST_SINK_KIND)], &table(&factory), &LogSink::disabled())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoadError::Factory {
                source: FactoryError::Validation(ValidationError::EmptyIdentifier),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_duplicate_identifier() {
        let factory = TestSinkFactory::default();
        let specs = [spec("emi2t", TEST_SINK_KIND), spec("emi2t", TEST_SINK_KIND)];
        let err = load_peripherals(&specs, &table(&factory), &LogSink::disabled())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LoadError::Registry(RegistryError::DuplicateIdentifier(_))
        ));
        assert!(factory.journal.is_empty());
    }
}
