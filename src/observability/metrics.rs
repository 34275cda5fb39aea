//! Metrics collection and exposition.
//!
//! # Metrics
//! - `broker_operations_total` (counter): gateway calls by operation and outcome
//! - `broker_operation_duration_seconds` (histogram): executed call latency
//! - `broker_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `broker_cache_requests_total` (counter): lookups by tier and hit/miss
//! - `broker_cache_entries` (gauge): entries held per local store
//! - `broker_gateway_healthy` (gauge): 1=healthy, 0=unhealthy
//! - `broker_health_probe_duration_seconds` (histogram): probe latency,
//!   including short-circuited probes
//!
//! Without an installed recorder every call here is a no-op, so library
//! users and tests pay nothing.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

pub mod names {
    pub const OPERATIONS_TOTAL: &str = "broker_operations_total";
    pub const OPERATION_DURATION_SECONDS: &str = "broker_operation_duration_seconds";
    pub const CIRCUIT_STATE: &str = "broker_circuit_state";
    pub const CACHE_REQUESTS_TOTAL: &str = "broker_cache_requests_total";
    pub const CACHE_ENTRIES: &str = "broker_cache_entries";
    pub const GATEWAY_HEALTHY: &str = "broker_gateway_healthy";
    pub const HEALTH_PROBE_DURATION_SECONDS: &str = "broker_health_probe_duration_seconds";
}

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> bool {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            tracing::info!(address = %addr, "Prometheus exporter listening");
            true
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter");
            false
        }
    }
}

/// One breaker-visible outcome: `success`, `failure`, `timeout` or `rejected`.
pub fn record_operation(operation: &str, outcome: &str, latency: Duration) {
    counter!(
        names::OPERATIONS_TOTAL,
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    if outcome != "rejected" {
        histogram!(names::OPERATION_DURATION_SECONDS, "operation" => operation.to_string())
            .record(latency.as_secs_f64());
    }
}

pub fn record_circuit_state(operation: &str, value: f64) {
    gauge!(names::CIRCUIT_STATE, "operation" => operation.to_string()).set(value);
}

pub fn record_cache_request(tier: &str, hit: bool) {
    counter!(
        names::CACHE_REQUESTS_TOTAL,
        "tier" => tier.to_string(),
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

pub fn record_cache_entries(store: &str, entries: usize) {
    gauge!(names::CACHE_ENTRIES, "store" => store.to_string()).set(entries as f64);
}

pub fn record_health_probe(healthy: bool, latency: Duration) {
    gauge!(names::GATEWAY_HEALTHY).set(if healthy { 1.0 } else { 0.0 });
    histogram!(names::HEALTH_PROBE_DURATION_SECONDS).record(latency.as_secs_f64());
}
