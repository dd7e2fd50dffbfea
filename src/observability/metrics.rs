//! Metrics collection and exposition.
//!
//! # Metrics
//! - `facade_rpc_requests_total` (counter): RPC calls by method, outcome
//! - `facade_rpc_duration_seconds` (histogram): RPC latency by method
//! - `facade_endpoint_health` (gauge): 1=reachable, 0=unreachable
//! - `facade_transactions_submitted_total` (counter): submissions by outcome
//! - `facade_sms_sent_total` (counter): SMS sends by outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rpc(method: &'static str, outcome: &'static str, start: Instant) {
    metrics::counter!("facade_rpc_requests_total", "method" => method, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("facade_rpc_duration_seconds", "method" => method)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_endpoint_health(endpoint: &str, healthy: bool) {
    metrics::gauge!("facade_endpoint_health", "endpoint" => endpoint.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_submission(outcome: &'static str) {
    metrics::counter!("facade_transactions_submitted_total", "outcome" => outcome).increment(1);
}

pub fn record_sms(outcome: &'static str) {
    metrics::counter!("facade_sms_sent_total", "outcome" => outcome).increment(1);
}
