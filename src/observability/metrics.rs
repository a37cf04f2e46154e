//! Metrics collection and exposition.
//!
//! # Metrics
//! - `backstop_breaker_rejected_total` (counter): calls refused while open
//! - `backstop_breaker_transitions_total` (counter): transitions by target state
//! - `backstop_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `backstop_rate_limited_total` (counter): requests rejected by the limiter
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations behind the recorder)
//! - Prometheus exposition on a dedicated bind address

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr` and register metric help text.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }

    metrics::describe_counter!(
        "backstop_breaker_rejected_total",
        "Calls rejected while the circuit was open"
    );
    metrics::describe_counter!(
        "backstop_breaker_transitions_total",
        "Circuit breaker state transitions, labeled by target state"
    );
    metrics::describe_gauge!(
        "backstop_breaker_state",
        "Current circuit state: 0=closed, 1=open, 2=half-open"
    );
    metrics::describe_counter!(
        "backstop_rate_limited_total",
        "Requests rejected by the per-client rate limiter"
    );
}

/// Record a call rejected at admission because the circuit was open.
pub fn record_breaker_rejection() {
    metrics::counter!("backstop_breaker_rejected_total").increment(1);
}

/// Record a state transition; `to` is one of "closed", "open", "half-open".
pub fn record_breaker_transition(to: &'static str) {
    metrics::counter!("backstop_breaker_transitions_total", "to" => to).increment(1);
    let value = match to {
        "open" => 1.0,
        "half-open" => 2.0,
        _ => 0.0,
    };
    metrics::gauge!("backstop_breaker_state").set(value);
}

/// Record a request rejected by the rate limiter.
pub fn record_rate_limited(reason: &'static str) {
    metrics::counter!("backstop_rate_limited_total", "reason" => reason).increment(1);
}
