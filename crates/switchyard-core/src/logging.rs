//! Leveled logging capability handed to peripherals.

use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, Level};

/// Where a peripheral writes its logs, and how verbosely.
///
/// Wraps the `tracing` dispatcher the host installed together with a
/// per-peripheral verbosity ceiling.
#[derive(Clone, Debug)]
pub struct LogSink {
    dispatch: Dispatch,
    level: LevelFilter,
}

impl LogSink {
    #[must_use]
    pub fn new(dispatch: Dispatch, level: LevelFilter) -> Self {
        Self { dispatch, level }
    }

    /// Log sink bound to the dispatcher active on the calling thread.
    #[must_use]
    pub fn current(level: LevelFilter) -> Self {
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        Self::new(dispatch, level)
    }

    /// A sink that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Dispatch::none(), LevelFilter::OFF)
    }

    #[must_use]
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Check whether records at `level` pass this sink's ceiling.
    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    /// Run `f` with this sink's dispatcher as the default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

/// Map a numeric verbosity (0 = off, 1 = error ... 5+ = trace) to a filter.
#[must_use]
pub fn level_from_verbosity(verbosity: u32) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::OFF,
        1 => LevelFilter::ERROR,
        2 => LevelFilter::WARN,
        3 => LevelFilter::INFO,
        4 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
