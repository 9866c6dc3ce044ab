//! Telemetry module
//!
//! Structured logging and Prometheus metrics.

mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{EngineMetrics, MetricsSnapshot};

use std::net::{Ipv4Addr, SocketAddr};

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::TelemetryConfig;

/// Guard that keeps telemetry alive for the process lifetime
pub struct TelemetryGuard {
    _priv: (),
}

/// Initialize logging and the metrics exporter
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level)?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(port = config.metrics_port, "metrics exporter listening");

    Ok(TelemetryGuard { _priv: () })
}
