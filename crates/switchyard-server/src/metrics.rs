//! Prometheus export of the router's metrics.

use crate::config::MetricsConfig;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::{Ipv4Addr, SocketAddr};
use tracing::{debug, info};

/// Start the Prometheus listener if metrics are enabled.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn init(config: &MetricsConfig) -> Result<Option<SocketAddr>, BuildError> {
    if !config.enabled {
        debug!("Metrics export disabled");
        return Ok(None);
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    switchyard_core::metrics::describe_metrics();

    info!(%addr, "Metrics server listening");
    Ok(Some(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_noop() {
        let config = MetricsConfig::default();
        assert_eq!(init(&config).unwrap(), None);
    }
}
