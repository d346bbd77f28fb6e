//! Metrics collection and exposition.
//!
//! # Metrics
//! - `meshlink_client_requests_total` (counter): outbound requests by service, outcome
//! - `meshlink_breaker_transitions_total` (counter): breaker transitions by service, state
//! - `meshlink_instance_health` (gauge): 1=healthy, 0=unhealthy, per instance
//! - `meshlink_bus_events_published_total` (counter): published events by type
//! - `meshlink_bus_retry_queue_depth` (gauge): pending redeliveries
//! - `meshlink_bus_retries_dropped_total` (counter): deliveries dropped after max retries
//!
//! # Design Decisions
//! - Low-overhead updates (atomic operations behind the metrics macros)
//! - Labels carry logical service names, never full URLs with credentials

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exposition endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to start metrics endpoint"),
    }
}

/// Record one outbound request outcome ("success", "status", "timeout",
/// "transport", "no_instance", "circuit_open").
pub fn record_request(service: &str, outcome: &'static str) {
    counter!(
        "meshlink_client_requests_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a breaker state transition.
pub fn record_breaker_transition(service: &str, state: &'static str) {
    counter!(
        "meshlink_breaker_transitions_total",
        "service" => service.to_string(),
        "state" => state
    )
    .increment(1);
}

/// Record the probed health of one instance.
pub fn record_instance_health(service: &str, instance: &str, healthy: bool) {
    gauge!(
        "meshlink_instance_health",
        "service" => service.to_string(),
        "instance" => instance.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Record one published event.
pub fn record_event_published(event_type: &str) {
    counter!(
        "meshlink_bus_events_published_total",
        "type" => event_type.to_string()
    )
    .increment(1);
}

/// Record the current retry queue depth.
pub fn record_retry_queue_depth(depth: usize) {
    gauge!("meshlink_bus_retry_queue_depth").set(depth as f64);
}

/// Record a delivery permanently dropped after exhausting retries.
pub fn record_retry_dropped(event_type: &str) {
    counter!(
        "meshlink_bus_retries_dropped_total",
        "type" => event_type.to_string()
    )
    .increment(1);
}
