//! Metrics collection and exposition.
//!
//! # Metrics
//! - `whats_up_log_requests_total` (counter): requests by route, status
//! - `whats_up_log_request_duration_seconds` (histogram): latency distribution
//! - `whats_up_log_outbound_total` (counter): outbound calls by target, outcome
//!
//! Recording is a no-op until a recorder is installed, so handlers record
//! unconditionally.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::observability::tracing::ConfigurationError;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), ConfigurationError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ConfigurationError::Metrics(e.to_string()))?;

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a completed inbound request.
pub fn record_request(route: &str, status: u16, start: Instant) {
    counter!(
        "whats_up_log_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("whats_up_log_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Outcome of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    NotFound,
    Error,
    Cancelled,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::NotFound => "not_found",
            Outcome::Error => "error",
            Outcome::Cancelled => "cancelled",
        }
    }
}

/// Record an outbound HTTP or storage call.
pub fn record_outbound(target: &'static str, outcome: Outcome) {
    counter!(
        "whats_up_log_outbound_total",
        "target" => target,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}
