//! Tracing subscriber setup.
//!
//! The same dispatcher is installed globally and handed to peripherals
//! through their [`LogSink`].

use crate::config::Config;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchyard_core::logging::level_from_verbosity;
use switchyard_core::LogSink;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing::Dispatch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to open log file {}: {source}", .path.display())]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to install tracing subscriber: {0}")]
    Install(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

/// Build the dispatcher described by `config`.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
///
/// Returns [`LoggingError::OpenFile`] if the log file cannot be opened.
pub fn build(config: &Config, verbosity: u32) -> Result<(Dispatch, LevelFilter), LoggingError> {
    let level = level_from_verbosity(verbosity);
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stdout = config
        .log_stdout
        .then(|| fmt::layer().with_target(true).with_thread_ids(false));

    let file = match &config.log_file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(open_append(path)?)),
        ),
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file);

    Ok((Dispatch::new(subscriber), level))
}

/// Build and install the global subscriber.
///
/// # Errors
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init(config: &Config, verbosity: u32) -> Result<LogSink, LoggingError> {
    let (dispatch, level) = build(config, verbosity)?;
    tracing::dispatcher::set_global_default(dispatch.clone())?;
    Ok(LogSink::new(dispatch, level))
}

fn open_append(path: &Path) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::OpenFile {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_logging() {
        let path = std::env::temp_dir().join(format!(
            "switchyard-log-{}.log",
            std::process::id()
        ));
        std::fs::remove_file(&path).ok();

        let mut config = Config::default();
        config.log_stdout = false;
        config.log_file = Some(path.clone());
        let (dispatch, level) = build(&config, 3).unwrap();
        assert_eq!(level, LevelFilter::INFO);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(peripheral = "emirc", "Written to file");
            tracing::debug!("Filtered out");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(contents.contains("Written to file"));
        assert!(contents.contains("peripheral=\"emirc\""));
        assert!(!contents.contains("Filtered out"));
    }

    #[test]
    fn test_unopenable_file() {
        let mut config = Config::default();
        config.log_file = Some(PathBuf::from("/nonexistent/dir/switchyard.log"));
        assert!(matches!(build(&config, 3), Err(LoggingError::OpenFile { .. })));
    }
}
