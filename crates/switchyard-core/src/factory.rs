//! Factory contract for constructing peripherals.
//!
//! Construction is a two-step negotiation that keeps the core ignorant of
//! concrete peripheral types:
//!
//! 1. [`PeripheralFactory::new_options`] hands out a fresh, type-specific
//!    options value.
//! 2. The initializer fills in the common fields through the
//!    [`PeripheralOptions`] setters.
//! 3. [`PeripheralFactory::new_peripheral`] validates the options and builds
//!    the peripheral.
//!
//! Factories are collected in a [`FactoryTable`] keyed by a kind tag.

use crate::logging::LogSink;
use crate::peripheral::{Peripheral, PeripheralId};
use crate::registry::CoreHandle;
use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Missing or malformed mandatory options.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Peripheral identifier cannot be empty")]
    EmptyIdentifier,

    #[error("Core handle has not been set")]
    MissingCore,

    #[error("Logging sink has not been set")]
    MissingLogSink,

    #[error("Configuration path cannot be empty")]
    EmptyConfigPath,
}

/// Peripheral construction errors.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// Options failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No factory registered for this kind.
    #[error("Unknown peripheral kind: {0}")]
    UnknownKind(String),

    /// A factory with this kind is already in the table.
    #[error("Duplicate peripheral kind: {0}")]
    DuplicateKind(String),

    /// Options were produced by a different factory.
    #[error("Options are not compatible with peripheral kind {0}")]
    IncompatibleOptions(&'static str),

    /// The peripheral's own configuration could not be loaded.
    #[error("Failed to load configuration {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    /// The peripheral could not be built.
    #[error("Failed to build peripheral {id}: {message}")]
    Build { id: PeripheralId, message: String },
}

/// Options common to every peripheral.
#[derive(Debug, Clone, Default)]
pub struct BaseOptions {
    /// Unique identifier for the peripheral.
    pub identifier: Option<PeripheralId>,
    /// Services the peripheral may call back into.
    pub core: Option<CoreHandle>,
    /// Logging sink.
    pub log: Option<LogSink>,
    /// Path to implementation-specific configuration.
    pub config_path: Option<PathBuf>,
}

impl BaseOptions {
    /// Check that every mandatory field is present.
    ///
    /// # Errors
    ///
    /// Returns the first missing or empty field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.identifier {
            Some(id) if !id.is_empty() => {}
            _ => return Err(ValidationError::EmptyIdentifier),
        }
        if self.core.is_none() {
            return Err(ValidationError::MissingCore);
        }
        if self.log.is_none() {
            return Err(ValidationError::MissingLogSink);
        }
        Ok(())
    }

    /// Validate and split into the checked parts.
    ///
    /// # Errors
    ///
    /// Same as [`BaseOptions::validate`].
    pub fn into_validated(self) -> Result<ValidatedBase, ValidationError> {
        self.validate()?;
        match (self.identifier, self.core, self.log) {
            (Some(id), Some(core), Some(log)) => Ok(ValidatedBase {
                id,
                core,
                log,
                config_path: self.config_path,
            }),
            (None, _, _) => Err(ValidationError::EmptyIdentifier),
            (_, None, _) => Err(ValidationError::MissingCore),
            (_, _, None) => Err(ValidationError::MissingLogSink),
        }
    }
}

/// Common options after validation.
#[derive(Debug, Clone)]
pub struct ValidatedBase {
    pub id: PeripheralId,
    pub core: CoreHandle,
    pub log: LogSink,
    pub config_path: Option<PathBuf>,
}

/// Type-specific options builder produced by a factory.
///
/// Implementors only provide access to their [`BaseOptions`] and the
/// downcast hook; the setters have default implementations.
pub trait PeripheralOptions: Send + 'static {
    fn base(&self) -> &BaseOptions;

    fn base_mut(&mut self) -> &mut BaseOptions;

    /// Convert into `Any` so the owning factory can recover its type.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;

    /// Set the unique identifier.
    ///
    /// # Errors
    ///
    /// Rejects an empty identifier.
    fn identifier(&mut self, id: &str) -> Result<(), ValidationError> {
        if id.is_empty() {
            return Err(ValidationError::EmptyIdentifier);
        }
        self.base_mut().identifier = Some(PeripheralId::new(id));
        Ok(())
    }

    /// Set the services handle.
    ///
    /// # Errors
    ///
    /// Rejects a handle whose registry is gone.
    fn core(&mut self, core: CoreHandle) -> Result<(), ValidationError> {
        if !core.is_alive() {
            return Err(ValidationError::MissingCore);
        }
        self.base_mut().core = Some(core);
        Ok(())
    }

    /// Set the logging sink and its verbosity.
    ///
    /// # Errors
    ///
    /// Never fails for the default implementation.
    fn logging(&mut self, sink: LogSink, level: LevelFilter) -> Result<(), ValidationError> {
        self.base_mut().log = Some(LogSink::new(sink.dispatch().clone(), level));
        Ok(())
    }

    /// Set the path to implementation-specific configuration.
    ///
    /// # Errors
    ///
    /// Rejects an empty path.
    fn config_path(&mut self, path: &Path) -> Result<(), ValidationError> {
        if path.as_os_str().is_empty() {
            return Err(ValidationError::EmptyConfigPath);
        }
        self.base_mut().config_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Check the mandatory fields.
    ///
    /// # Errors
    ///
    /// See [`BaseOptions::validate`].
    fn validate(&self) -> Result<(), ValidationError> {
        self.base().validate()
    }
}

/// Recover a factory's own options type from a boxed options value.
///
/// # Errors
///
/// Returns [`FactoryError::IncompatibleOptions`] when `options` belongs to
/// another factory.
pub fn downcast_options<T: PeripheralOptions>(
    options: Box<dyn PeripheralOptions>,
    kind: &'static str,
) -> Result<T, FactoryError> {
    options
        .into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| FactoryError::IncompatibleOptions(kind))
}

/// Constructs one kind of peripheral.
pub trait PeripheralFactory: Send + Sync {
    /// Tag used to select this factory from configuration.
    fn kind(&self) -> &'static str;

    /// Fresh options for this kind.
    fn new_options(&self) -> Box<dyn PeripheralOptions>;

    /// Build a peripheral from populated options.
    ///
    /// # Errors
    ///
    /// Fails on invalid options, foreign options or construction errors.
    fn new_peripheral(
        &self,
        options: Box<dyn PeripheralOptions>,
    ) -> Result<Arc<dyn Peripheral>, FactoryError>;
}

/// Explicitly registered factories, keyed by kind.
#[derive(Default, Clone)]
pub struct FactoryTable {
    factories: HashMap<String, Arc<dyn PeripheralFactory>>,
}

impl FactoryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a factory.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::DuplicateKind`] if the kind is taken.
    pub fn register(&mut self, factory: Arc<dyn PeripheralFactory>) -> Result<(), FactoryError> {
        let kind = factory.kind().to_string();
        if self.factories.contains_key(&kind) {
            return Err(FactoryError::DuplicateKind(kind));
        }
        self.factories.insert(kind, factory);
        Ok(())
    }

    /// Builder-style [`FactoryTable::register`].
    ///
    /// # Errors
    ///
    /// Same as [`FactoryTable::register`].
    pub fn with(mut self, factory: Arc<dyn PeripheralFactory>) -> Result<Self, FactoryError> {
        self.register(factory)?;
        Ok(self)
    }

    /// Find the factory for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::UnknownKind`] when nothing is registered.
    pub fn get(&self, kind: &str) -> Result<&Arc<dyn PeripheralFactory>, FactoryError> {
        self.factories
            .get(kind)
            .ok_or_else(|| FactoryError::UnknownKind(kind.to_string()))
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::testing::{TestSinkFactory, TEST_SINK_KIND};

    fn populated(registry: &Arc<Registry>) -> Box<dyn PeripheralOptions> {
        let mut opts = TestSinkFactory::default().new_options();
        opts.identifier("emi2t").unwrap();
        opts.core(registry.handle()).unwrap();
        opts.logging(LogSink::disabled(), LevelFilter::INFO).unwrap();
        opts
    }

    #[test]
    fn test_two_step_construction() {
        let registry = Arc::new(Registry::new());
        let opts = populated(&registry);
        assert!(opts.validate().is_ok());
        assert_eq!(opts.base().log.as_ref().map(LogSink::level), Some(LevelFilter::INFO));

        let peripheral = TestSinkFactory::default().new_peripheral(opts).unwrap();
        assert_eq!(peripheral.id().as_str(), "emi2t");
        assert!(peripheral.sink().is_some());
        assert!(peripheral.source().is_none());
    }

    #[test]
    fn test_setters_reject_empty_values() {
        let mut opts = TestSinkFactory::default().new_options();
        assert_eq!(opts.identifier(""), Err(ValidationError::EmptyIdentifier));
        assert_eq!(
            opts.config_path(Path::new("")),
            Err(ValidationError::EmptyConfigPath)
        );

        let registry = Arc::new(Registry::new());
        let handle = registry.handle();
        drop(registry);
        assert_eq!(opts.core(handle), Err(ValidationError::MissingCore));
    }

    #[test]
    fn test_validation_reports_missing_fields() {
        let registry = Arc::new(Registry::new());

        let opts = TestSinkFactory::default().new_options();
        assert_eq!(opts.validate(), Err(ValidationError::EmptyIdentifier));

        let mut opts = TestSinkFactory::default().new_options();
        opts.identifier("emi2t").unwrap();
        assert_eq!(opts.validate(), Err(ValidationError::MissingCore));

        opts.core(registry.handle()).unwrap();
        assert_eq!(opts.validate(), Err(ValidationError::MissingLogSink));
        assert!(matches!(
            TestSinkFactory::default().new_peripheral(opts),
            Err(FactoryError::Validation(ValidationError::MissingLogSink))
        ));
    }

    struct ForeignOptions(BaseOptions);

    impl PeripheralOptions for ForeignOptions {
        fn base(&self) -> &BaseOptions {
            &self.0
        }

        fn base_mut(&mut self) -> &mut BaseOptions {
            &mut self.0
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
            self
        }
    }

    #[test]
    fn test_foreign_options_rejected() {
        let opts = Box::new(ForeignOptions(BaseOptions::default()));
        assert!(matches!(
            TestSinkFactory::default().new_peripheral(opts),
            Err(FactoryError::IncompatibleOptions(TEST_SINK_KIND))
        ));
    }

    #[test]
    fn test_factory_table() {
        let table = FactoryTable::new().with(Arc::new(TestSinkFactory::default())).unwrap();
        assert_eq!(table.kinds(), vec![TEST_SINK_KIND]);
        assert!(table.get(TEST_SINK_KIND).is_ok());
        assert!(matches!(
            table.get("irc"),
            Err(FactoryError::UnknownKind(kind)) if kind == "irc"
        ));

        let mut table = table;
        assert!(matches!(
            table.register(Arc::new(TestSinkFactory::default())),
            Err(FactoryError::DuplicateKind(_))
        ));
    }
}
