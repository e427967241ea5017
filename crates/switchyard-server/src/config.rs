//! Daemon configuration.
//!
//! Loaded once at startup from a TOML file, either the one given on the
//! command line or the first match in the search path:
//! - `switchyard.toml`
//! - `/etc/switchyard/switchyard.toml`
//! - `~/.config/switchyard/switchyard.toml`

use serde::Deserialize;
use std::path::{Path, PathBuf};
use switchyard_core::router::DEFAULT_QUEUE_CAPACITY;
use switchyard_core::{PeripheralSpec, RouteDescriptor, RouterConfig, UnknownSourcePolicy};
use thiserror::Error;

const SEARCH_PATH: [&str; 3] = [
    "switchyard.toml",
    "/etc/switchyard/switchyard.toml",
    "~/.config/switchyard/switchyard.toml",
];

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("No config file given and none found in: {}", SEARCH_PATH.join(", "))]
    NotFound,
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Write logs to standard output.
    #[serde(default = "default_true")]
    pub log_stdout: bool,

    /// Append logs to this file.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Verbosity, 0 (off) to 5 (trace).
    #[serde(default = "default_log_level")]
    pub log_level: u32,

    #[serde(default)]
    pub router: RouterSection,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub peripherals: Vec<PeripheralConfig>,

    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    /// Directory relative peripheral config paths are resolved against.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// `[router]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSection {
    /// Capacity of the shared sink queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Handling of events from sources without a route.
    #[serde(default)]
    pub on_unknown_source: OnUnknownSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnUnknownSource {
    /// Stop routing.
    #[default]
    Halt,
    /// Log, drop the event and keep routing.
    Log,
}

/// `[metrics]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// One `[[peripherals]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeripheralConfig {
    pub identifier: String,
    /// Factory kind tag.
    pub kind: String,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
}

/// One `[[routes]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    pub source: String,
    #[serde(default)]
    pub destinations: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> u32 {
    3
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_stdout: true,
            log_file: None,
            log_level: default_log_level(),
            router: RouterSection::default(),
            metrics: MetricsConfig::default(),
            peripherals: Vec::new(),
            routes: Vec::new(),
            base_dir: None,
        }
    }
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            on_unknown_source: OnUnknownSource::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the first file found in the search path.
    ///
    /// # Errors
    ///
    /// Returns an error if no file can be found, read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        for candidate in &SEARCH_PATH {
            let expanded = shellexpand::tilde(candidate);
            let candidate = Path::new(expanded.as_ref());
            if candidate.exists() {
                return Self::from_file(candidate);
            }
        }

        Err(ConfigError::NotFound)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);

        Ok(config)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the parser error for malformed input.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Peripheral specs for the loader, with config paths resolved.
    #[must_use]
    pub fn peripheral_specs(&self) -> Vec<PeripheralSpec> {
        self.peripherals
            .iter()
            .map(|p| PeripheralSpec {
                identifier: p.identifier.clone(),
                kind: p.kind.clone(),
                config_path: p.config_path.as_deref().map(|path| self.resolve(path)),
            })
            .collect()
    }

    /// Route descriptors, in file order.
    #[must_use]
    pub fn route_descriptors(&self) -> Vec<RouteDescriptor> {
        self.routes
            .iter()
            .map(|r| RouteDescriptor::new(r.source.clone(), r.destinations.iter().cloned()))
            .collect()
    }

    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            queue_capacity: self.router.queue_capacity,
            unknown_source: match self.router.on_unknown_source {
                OnUnknownSource::Halt => UnknownSourcePolicy::Halt,
                OnUnknownSource::Log => UnknownSourcePolicy::LogAndContinue,
            },
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
        match &self.base_dir {
            Some(base) if expanded.is_relative() => base.join(expanded),
            _ => expanded,
        }
    }
}
