//! Metrics collection and exposition.
//!
//! # Metrics
//! - `deposit_attempts_total` (counter): deposit attempts by outcome
//! - `deposit_retries_total` (counter): scheduled retries by cause
//! - `deposit_submissions_total` (counter): accepted submissions by broadcast path
//! - `deposit_approvals_total` (counter): approval transactions sent
//! - `deposit_last_block` (gauge): last block that triggered an attempt
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - The Prometheus listener is opt-in (`observability.metrics_enabled`)

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter with an HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the outcome of one attempt (`submitted`, `simulation_failed`, `rejected`, ...).
pub fn record_attempt(outcome: &'static str) {
    counter!("deposit_attempts_total", "outcome" => outcome).increment(1);
}

/// Record a scheduled retry.
pub fn record_retry(cause: &'static str) {
    counter!("deposit_retries_total", "cause" => cause).increment(1);
}

/// Record a submission accepted by the gateway.
pub fn record_submission(path: &'static str) {
    counter!("deposit_submissions_total", "path" => path).increment(1);
}

/// Record an approval transaction.
pub fn record_approval() {
    counter!("deposit_approvals_total").increment(1);
}

/// Record the block that triggered the latest attempt.
pub fn record_block(number: u64) {
    gauge!("deposit_last_block").set(number as f64);
}
