//! Static routing table: source identifier to destination identifiers.
//!
//! The table is compiled once from route descriptors and never changes
//! afterwards, so lookups need no locking.

use crate::peripheral::PeripheralId;
use std::collections::HashMap;
use thiserror::Error;

/// Route validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// A route descriptor is malformed.
    #[error("Invalid route{}: {reason}", source_label(.source_id))]
    InvalidRoute {
        /// Source of the offending route, when it is known.
        source_id: Option<String>,
        reason: &'static str,
    },
}

fn source_label(source_id: &Option<String>) -> String {
    source_id
        .as_ref()
        .map(|s| format!(" for source \"{s}\""))
        .unwrap_or_default()
}

impl RouteError {
    fn invalid(source_id: Option<&str>, reason: &'static str) -> Self {
        Self::InvalidRoute {
            source_id: source_id.map(str::to_string),
            reason,
        }
    }
}

/// One route as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub source: String,
    pub destinations: Vec<String>,
}

impl RouteDescriptor {
    #[must_use]
    pub fn new<I, S>(source: impl Into<String>, destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source: source.into(),
            destinations: destinations.into_iter().map(Into::into).collect(),
        }
    }

    fn validate(&self) -> Result<(), RouteError> {
        if self.source.is_empty() {
            return Err(RouteError::invalid(None, "source cannot be empty"));
        }
        if self.destinations.is_empty() {
            return Err(RouteError::invalid(
                Some(&self.source),
                "destination list cannot be empty",
            ));
        }
        if self.destinations.iter().any(String::is_empty) {
            return Err(RouteError::invalid(
                Some(&self.source),
                "destination cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Validated mapping from source to an ordered set of destinations.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<PeripheralId, Vec<PeripheralId>>,
}

impl RoutingTable {
    /// Compile a table from route descriptors.
    ///
    /// Descriptors sharing a source are merged in order. A destination
    /// listed more than once for the same source is kept at its first
    /// position only.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidRoute`] for an empty source, an empty
    /// destination list, or an empty destination.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = RouteDescriptor>,
    {
        let mut routes: HashMap<PeripheralId, Vec<PeripheralId>> = HashMap::new();

        for descriptor in descriptors {
            descriptor.validate()?;
            let destinations = routes.entry(PeripheralId::new(descriptor.source)).or_default();
            for dst in descriptor.destinations {
                if !destinations.iter().any(|d| d.as_str() == dst) {
                    destinations.push(PeripheralId::new(dst));
                }
            }
        }

        Ok(Self { routes })
    }

    /// Destinations for `source`, in delivery order.
    #[must_use]
    pub fn route(&self, source: &str) -> Option<&[PeripheralId]> {
        self.routes.get(source).map(Vec::as_slice)
    }

    #[must_use]
    pub fn has_route(&self, source: &str) -> bool {
        self.routes.contains_key(source)
    }

    /// Number of distinct sources.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Iterate over all routes.
    pub fn iter(&self) -> impl Iterator<Item = (&PeripheralId, &[PeripheralId])> {
        self.routes.iter().map(|(k, v)| (k, v.as_slice()))
    }
}
