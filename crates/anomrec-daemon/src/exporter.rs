//! Prometheus exporter.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::error::{DaemonError, DaemonResult};

/// Install the global recorder and serve `/metrics` on `addr`.
///
/// Must run inside a tokio runtime: the listener is spawned onto it.
pub fn init_metrics(addr: SocketAddr) -> DaemonResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| DaemonError::metrics(e.to_string()))?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}
