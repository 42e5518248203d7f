//! Metrics initialization for Prometheus exporter.
//!
//! Metric names are kept here so the capture engine and the synchronizer
//! record into the same series.

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::error::Result;

pub const PACKETS_CAPTURED: &str = "netmonitor_packets_captured_total";
pub const PACKETS_BLOCKED: &str = "netmonitor_packets_blocked_total";
pub const CAPTURE_ERRORS: &str = "netmonitor_capture_errors_total";
pub const ENTRIES_ADDED: &str = "netmonitor_blacklist_entries_added_total";
pub const FEED_FETCH_FAILURES: &str = "netmonitor_feed_fetch_failures_total";
pub const BLACKLIST_ENTRIES: &str = "netmonitor_blacklist_entries";
pub const SYNC_OFFSET: &str = "netmonitor_sync_offset";

/// Initialize the metrics system based on configuration.
///
/// When metrics are enabled, this starts an HTTP server that exposes
/// a `/metrics` endpoint for Prometheus to scrape.
///
/// When metrics are disabled, this is a no-op. The `metrics` crate
/// handles unregistered metrics gracefully (they become no-ops).
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(|err| crate::error::Error::Metrics(err.to_string()))?;

    Ok(())
}
