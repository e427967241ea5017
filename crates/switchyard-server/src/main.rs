//! # Switchyard
//!
//! Event bus daemon: loads the configured peripherals, then routes events
//! from sources to sinks until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! # Use the first config file found in the search path
//! switchyard
//!
//! # Explicit config file, more verbose logging
//! switchyard --config /etc/switchyard/switchyard.toml --log-level 4
//!
//! # Per-module filtering
//! RUST_LOG=switchyard_core=trace switchyard
//! ```
//!
//! Exit status names the stage that failed: 1 configuration, 2 logging,
//! 3 peripheral loading, 4 router construction, 5 routing.

mod config;
mod logging;
mod metrics;

use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use switchyard_core::{load_peripherals, Router};
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Switchyard - event bus daemon
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log verbosity, 0 (off) to 5 (trace); overrides the config file
    #[arg(short, long)]
    log_level: Option<u32>,
}

/// Startup and run stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Config,
    Logging,
    Core,
    Router,
    Run,
}

impl Stage {
    fn exit_status(self) -> u8 {
        match self {
            Self::Config => 1,
            Self::Logging => 2,
            Self::Core => 3,
            Self::Router => 4,
            Self::Run => 5,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Config => "configuration",
            Self::Logging => "logging setup",
            Self::Core => "peripheral loading",
            Self::Router => "router construction",
            Self::Run => "routing",
        })
    }
}

#[derive(Debug, Error)]
#[error("{stage} failed: {error:#}")]
struct Failure {
    stage: Stage,
    error: anyhow::Error,
}

trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T, Failure>;
}

impl<T, E> StageExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn stage(self, stage: Stage) -> Result<T, Failure> {
        self.map_err(|e| Failure {
            stage,
            error: e.into(),
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            if failure.stage > Stage::Logging {
                error!(stage = %failure.stage, error = %failure.error, "Switchyard stopped");
            }
            eprintln!("switchyard: {failure}");
            ExitCode::from(failure.stage.exit_status())
        }
    }
}

async fn run(cli: Cli) -> Result<(), Failure> {
    let config = config::Config::load(cli.config.as_deref()).stage(Stage::Config)?;

    let verbosity = cli.log_level.unwrap_or(config.log_level);
    let log = logging::init(&config, verbosity).stage(Stage::Logging)?;

    info!(
        peripherals = config.peripherals.len(),
        routes = config.routes.len(),
        "Starting switchyard"
    );

    metrics::init(&config.metrics).stage(Stage::Core)?;

    let factories = switchyard_peripherals::builtin_factories().stage(Stage::Core)?;
    let registry = load_peripherals(&config.peripheral_specs(), &factories, &log)
        .await
        .stage(Stage::Core)?;

    let router = Router::new(
        registry,
        config.route_descriptors(),
        config.router_config(),
    )
    .stage(Stage::Router)?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    router.run(cancel).await.stage(Stage::Run)?;

    info!("Switchyard stopped");
    Ok(())
}

/// Cancel `cancel` on SIGINT or SIGTERM.
async fn shutdown_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => return,
    }

    info!("Shutdown signal received");
    cancel.cancel();
}
