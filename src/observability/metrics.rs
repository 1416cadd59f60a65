//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_requests_total` (counter): requests by method and status
//! - `guard_request_duration_seconds` (histogram): latency distribution
//! - `guard_rejections_total` (counter): rejections by type
//! - `guard_rate_limited_total` (counter): rate limit breaches by class
//! - `guard_rate_limit_keys` (gauge): tracked rate-limit keys
//! - `security_events_total` (counter): audit events by kind
//! - `analytics_events_total` (counter): accepted analytics events by type
//! - `analytics_dropped_total` (counter): dropped analytics events by reason
//!
//! Recording is a no-op until a recorder is installed, so library code and
//! tests call these freely.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "guard_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("guard_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(kind: &'static str) {
    counter!("guard_rejections_total", "type" => kind).increment(1);
}

pub fn record_rate_limited(class: &'static str) {
    counter!("guard_rate_limited_total", "class" => class).increment(1);
}

pub fn record_rate_limit_keys(count: usize) {
    gauge!("guard_rate_limit_keys").set(count as f64);
}

pub fn record_security_event(kind: &'static str) {
    counter!("security_events_total", "kind" => kind).increment(1);
}

pub fn record_analytics_event(event_type: &'static str) {
    counter!("analytics_events_total", "event_type" => event_type).increment(1);
}

pub fn record_analytics_dropped(reason: &'static str) {
    counter!("analytics_dropped_total", "reason" => reason).increment(1);
}
