//! Metrics collection and exposition.
//!
//! # Metrics
//! - `zk_requests_total` (counter): requests by op name
//! - `zk_connections_active` (gauge): open client connections
//! - `zk_sessions_active` (gauge): live sessions
//! - `zk_znode_count` (gauge): nodes in the tree
//! - `zk_watch_count` (gauge): registered watches
//! - `zk_startup_failures_total` (counter): failed bootstrap attempts
//!
//! Every helper is a cheap no-op until `init_metrics` installs a recorder.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(op: &'static str) {
    metrics::counter!("zk_requests_total", "op" => op).increment(1);
}

pub fn set_active_connections(count: u64) {
    metrics::gauge!("zk_connections_active").set(count as f64);
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("zk_sessions_active").set(count as f64);
}

/// Tree-level gauges, refreshed after each write.
pub fn record_tree(znodes: usize, watches: usize) {
    metrics::gauge!("zk_znode_count").set(znodes as f64);
    metrics::gauge!("zk_watch_count").set(watches as f64);
}

pub fn record_startup_failure() {
    metrics::counter!("zk_startup_failures_total").increment(1);
}
