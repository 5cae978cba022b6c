//! Metrics definitions for the system user client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sysuser_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `outcome`: success, rejected, transport, invalid_token,
//!   contract_violation, cancelled, configuration
//! - `result`: valid or one of the `ValidationFailure::check` labels
//!
//! The tenant subdomain is never a label.

use metrics::{counter, histogram};
use std::time::Duration;

/// Record one full ticket acquisition.
///
/// Metric: `sysuser_exchange_total`, `sysuser_exchange_duration_seconds`
/// Labels: `outcome`
pub fn record_exchange(outcome: &str, duration: Duration) {
    histogram!("sysuser_exchange_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("sysuser_exchange_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one token validation.
///
/// Metric: `sysuser_validation_total`
/// Labels: `result`
pub fn record_validation(result: &str) {
    counter!("sysuser_validation_total",
        "result" => result.to_string()
    )
    .increment(1);
}
