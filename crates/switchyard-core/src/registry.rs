//! Peripheral registry.
//!
//! The registry owns every instantiated peripheral, keyed by identifier. It is
//! filled during startup and sealed when the router is built; after that it
//! only serves concurrent readers and never loses an entry.

use crate::peripheral::{Peripheral, PeripheralId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::debug;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A peripheral with the same identifier is already registered.
    #[error("Duplicate peripheral identifier: {0}")]
    DuplicateIdentifier(PeripheralId),

    /// Registration attempted after the registry was sealed.
    #[error("Registry is sealed, cannot register {0}")]
    Sealed(PeripheralId),

    /// The peripheral reports an empty identifier.
    #[error("Peripheral identifier cannot be empty")]
    EmptyIdentifier,
}

/// The process-lifetime store of all peripherals.
#[derive(Default)]
pub struct Registry {
    peripherals: DashMap<PeripheralId, Arc<dyn Peripheral>>,
    sealed: AtomicBool,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peripheral under its own identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateIdentifier`] if the identifier is
    /// taken (the new peripheral is dropped), [`RegistryError::EmptyIdentifier`]
    /// for an empty identifier, or [`RegistryError::Sealed`] once the registry
    /// has been sealed.
    pub fn register(&self, peripheral: Arc<dyn Peripheral>) -> Result<(), RegistryError> {
        let id = peripheral.id().clone();
        if self.is_sealed() {
            return Err(RegistryError::Sealed(id));
        }
        if id.is_empty() {
            return Err(RegistryError::EmptyIdentifier);
        }

        match self.peripherals.entry(id) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateIdentifier(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(
                    peripheral = %entry.key(),
                    capabilities = %peripheral.capabilities(),
                    "Registered peripheral"
                );
                entry.insert(peripheral);
                Ok(())
            }
        }
    }

    /// Look up a peripheral by identifier.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<Arc<dyn Peripheral>> {
        self.peripherals.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Check whether an identifier is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.peripherals.contains_key(id)
    }

    /// Apply `visitor` to every peripheral.
    ///
    /// Iteration order is unspecified. The first error returned by the
    /// visitor stops the iteration and is returned to the caller.
    ///
    /// The visitor must not register peripherals.
    ///
    /// # Errors
    ///
    /// Propagates the visitor's error.
    pub fn for_each<E, F>(&self, mut visitor: F) -> Result<(), E>
    where
        F: FnMut(&Arc<dyn Peripheral>) -> Result<(), E>,
    {
        for entry in self.peripherals.iter() {
            visitor(entry.value())?;
        }
        Ok(())
    }

    /// All registered identifiers, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<PeripheralId> {
        let mut ids: Vec<_> = self.peripherals.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peripherals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peripherals.is_empty()
    }

    /// Close the registry for further registration.
    pub fn seal(&self) {
        if !self.sealed.swap(true, Ordering::AcqRel) {
            debug!(peripherals = self.len(), "Registry sealed");
        }
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Services handle for peripherals that need to reach their peers.
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> CoreHandle {
        CoreHandle {
            registry: Arc::downgrade(self),
        }
    }
}

/// Services the core offers back to peripherals.
///
/// Holds the registry weakly, so a peripheral keeping its handle does not keep
/// the registry (and therefore itself) alive.
#[derive(Clone, Debug)]
pub struct CoreHandle {
    registry: Weak<Registry>,
}

impl CoreHandle {
    /// Find a peer peripheral by identifier.
    #[must_use]
    pub fn peripheral(&self, id: &str) -> Option<Arc<dyn Peripheral>> {
        self.registry.upgrade()?.lookup(id)
    }

    /// Identifiers of every registered peripheral.
    #[must_use]
    pub fn peripheral_ids(&self) -> Vec<PeripheralId> {
        self.registry
            .upgrade()
            .map(|registry| registry.ids())
            .unwrap_or_default()
    }

    /// Check whether the registry is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.registry.strong_count() > 0
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("peripherals", &self.ids())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
