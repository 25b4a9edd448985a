//! Metrics collection and exposition.
//!
//! # Metrics
//! - `custody_transitions_total` (counter): state changes by entity, from, to
//! - `custody_votes_total` (counter): approval votes by subject, decision, outcome
//! - `custody_policy_violations_total` (counter): rejected admissions by rule
//! - `custody_broadcast_attempts_total` (counter): broadcaster calls by result
//! - `custody_event_subscribers` (gauge): open change-notification streams
//! - `custody_http_request_duration_seconds` (histogram): API latency

use std::net::SocketAddr;
use std::time::Instant;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_transition(entity: &'static str, from: &str, to: &str) {
    metrics::counter!(
        "custody_transitions_total",
        "entity" => entity,
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

pub fn record_vote(subject: &'static str, decision: &str, outcome: &'static str) {
    metrics::counter!(
        "custody_votes_total",
        "subject" => subject,
        "decision" => decision.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_policy_violation(rule: &'static str) {
    metrics::counter!("custody_policy_violations_total", "rule" => rule).increment(1);
}

pub fn record_broadcast(result: &'static str) {
    metrics::counter!("custody_broadcast_attempts_total", "result" => result).increment(1);
}

pub fn record_subscribers(count: usize) {
    metrics::gauge!("custody_event_subscribers").set(count as f64);
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    metrics::histogram!(
        "custody_http_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}
