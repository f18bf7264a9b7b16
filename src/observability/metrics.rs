//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_circuit_transitions_total` (counter): breaker state changes by name, target state
//! - `shield_circuit_rejections_total` (counter): fast-failed calls by breaker name
//! - `shield_retry_attempts_total` (counter): attempts by operation, outcome
//! - `shield_failovers_total` (counter): failover/recovery outcomes
//! - `shield_endpoint_latency_seconds` (histogram): reported endpoint latency
//! - `shield_cache_lookups_total` (counter): hits and misses
//! - `shield_cache_evictions_total` (counter): evictions by policy
//! - `shield_cache_bytes` (gauge): resident cache size
//! - `shield_service_health_score` (gauge): last score per registered service
//!
//! # Design Decisions
//! - Uses the `metrics` facade; recording is a no-op until an exporter is installed
//! - Only the binaries install the Prometheus exporter

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_circuit_transition(name: &str, to: &str) {
    counter!(
        "shield_circuit_transitions_total",
        "name" => name.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

pub fn record_circuit_rejection(name: &str) {
    counter!("shield_circuit_rejections_total", "name" => name.to_string()).increment(1);
}

pub fn record_retry_attempt(operation: &str, outcome: &'static str) {
    counter!(
        "shield_retry_attempts_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_failover(outcome: &'static str) {
    counter!("shield_failovers_total", "outcome" => outcome).increment(1);
}

pub fn record_endpoint_latency(endpoint: &str, latency: Duration) {
    histogram!("shield_endpoint_latency_seconds", "endpoint" => endpoint.to_string())
        .record(latency.as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("shield_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_eviction(policy: &str) {
    counter!("shield_cache_evictions_total", "policy" => policy.to_string()).increment(1);
}

pub fn record_cache_size(bytes: usize, entries: usize) {
    gauge!("shield_cache_bytes").set(bytes as f64);
    gauge!("shield_cache_entries").set(entries as f64);
}

pub fn record_service_health(service: &str, score: u8) {
    gauge!("shield_service_health_score", "service" => service.to_string()).set(score as f64);
}
