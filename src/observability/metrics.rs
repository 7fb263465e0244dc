//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, policy outcomes, backends)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, method, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_short_circuits_total` (counter): policy short-circuits by route, policy
//! - `gateway_rate_limited_total` (counter): rate-limit rejections by route
//! - `gateway_upstream_failures_total` (counter): timeouts/connection errors by group, kind
//! - `gateway_backend_alive` (gauge): 1=alive, 0=dead
//! - `gateway_config_reloads_total` (counter): reload attempts by outcome
//! - `gateway_config_generation` (gauge): current generation number
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels for route, backend group, status code
//! - Every call is a no-op when no recorder is installed

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &str, method: &str, status: u16, started: Instant) {
    let route = route.to_string();
    let method = method.to_string();
    metrics::counter!(
        "gateway_requests_total",
        "route" => route.clone(),
        "method" => method.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "gateway_request_duration_seconds",
        "route" => route,
        "method" => method
    )
    .record(started.elapsed().as_secs_f64());
}

pub fn record_short_circuit(route: &str, policy: &str) {
    metrics::counter!(
        "gateway_short_circuits_total",
        "route" => route.to_string(),
        "policy" => policy.to_string()
    )
    .increment(1);
}

pub fn record_rate_limited(route: &str) {
    metrics::counter!("gateway_rate_limited_total", "route" => route.to_string()).increment(1);
}

pub fn record_upstream_failure(group: &str, kind: &'static str) {
    metrics::counter!(
        "gateway_upstream_failures_total",
        "group" => group.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_backend_health(group: &str, target: &str, alive: bool) {
    metrics::gauge!(
        "gateway_backend_alive",
        "group" => group.to_string(),
        "target" => target.to_string()
    )
    .set(if alive { 1.0 } else { 0.0 });
}

pub fn record_reload(success: bool, generation: u64) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("gateway_config_reloads_total", "outcome" => outcome).increment(1);
    if success {
        metrics::gauge!("gateway_config_generation").set(generation as f64);
    }
}
