//! Router instrumentation through the `metrics` facade.
//!
//! Recording is a no-op until the host installs a recorder.

use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const EVENTS_RECEIVED: &str = "switchyard_events_received_total";
    pub const EVENTS_DELIVERED: &str = "switchyard_events_delivered_total";
    pub const DELIVERIES_SKIPPED: &str = "switchyard_deliveries_skipped_total";
    pub const DELIVERIES_FAILED: &str = "switchyard_deliveries_failed_total";
    pub const EVENTS_UNROUTED: &str = "switchyard_events_unrouted_total";
    pub const SOURCES_ACTIVE: &str = "switchyard_sources_active";
}

/// Why a delivery was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Destination not registered.
    Missing,
    /// Destination registered without sink capability.
    NotASink,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::NotASink => "not_a_sink",
        }
    }
}

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        names::EVENTS_RECEIVED,
        "Events taken from the sink queue by the dispatch loop"
    );
    metrics::describe_counter!(names::EVENTS_DELIVERED, "Events accepted by a destination");
    metrics::describe_counter!(
        names::DELIVERIES_SKIPPED,
        "Deliveries skipped because the destination is missing or not a sink"
    );
    metrics::describe_counter!(
        names::DELIVERIES_FAILED,
        "Deliveries that the destination sink refused"
    );
    metrics::describe_counter!(
        names::EVENTS_UNROUTED,
        "Events whose source has no route"
    );
    metrics::describe_gauge!(names::SOURCES_ACTIVE, "Running forwarding tasks");
}

pub fn record_received(source: &str) {
    counter!(names::EVENTS_RECEIVED, "source" => source.to_string()).increment(1);
}

pub fn record_delivered(destination: &str) {
    counter!(names::EVENTS_DELIVERED, "destination" => destination.to_string()).increment(1);
}

pub fn record_skipped(reason: SkipReason) {
    counter!(names::DELIVERIES_SKIPPED, "reason" => reason.as_str()).increment(1);
}

pub fn record_failed(destination: &str) {
    counter!(names::DELIVERIES_FAILED, "destination" => destination.to_string()).increment(1);
}

pub fn record_unrouted(source: &str) {
    counter!(names::EVENTS_UNROUTED, "source" => source.to_string()).increment(1);
}

/// Gauge guard tracking a live forwarding task.
pub struct SourceGuard;

impl SourceGuard {
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::SOURCES_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for SourceGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        gauge!(names::SOURCES_ACTIVE).decrement(1.0);
    }
}
