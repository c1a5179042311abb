//! Prometheus metrics for the mediation pipeline.
//!
//! Metrics are exposed via a dedicated HTTP endpoint (default: `:9090/metrics`).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `rest_requests_total` - Mediated requests (labels: resource, action, status)
//! - `rest_aborts_total` - Aborted requests (label: status)
//! - `rest_ratelimited_total` - Requests rejected by the rate limiter (label: scope)
//! - `rest_log_flush_failures_total` - Request log writes that failed
//!
//! ## Histograms
//! - `rest_request_duration_seconds` - Time from pipeline start to response (labels: resource, action)
//!
//! ## Gauges
//! - `rest_log_records` - Records held by the log store, when it can tell
//!
//! # Usage
//!
//! ```rust,ignore
//! use rest_mediator::metrics::{init_metrics, record_request};
//!
//! // Initialize metrics (call once at startup)
//! init_metrics(addr)?;
//!
//! // Record metrics from the pipeline
//! record_request("widgets", "view", 200);
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "rest_requests_total";
    pub const ABORTS_TOTAL: &str = "rest_aborts_total";
    pub const RATELIMITED_TOTAL: &str = "rest_ratelimited_total";
    pub const LOG_FLUSH_FAILURES_TOTAL: &str = "rest_log_flush_failures_total";
    pub const REQUEST_DURATION_SECONDS: &str = "rest_request_duration_seconds";
    pub const LOG_RECORDS: &str = "rest_log_records";
}

/// Initialize the Prometheus metrics exporter.
///
/// Sets up metric descriptions and starts the Prometheus HTTP listener on
/// `metrics_addr`.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(names::REQUESTS_TOTAL, "Total number of mediated requests");
    describe_counter!(names::ABORTS_TOTAL, "Total number of aborted requests");
    describe_counter!(
        names::RATELIMITED_TOTAL,
        "Total number of requests rejected by the rate limiter"
    );
    describe_counter!(
        names::LOG_FLUSH_FAILURES_TOTAL,
        "Total number of request log writes that failed"
    );

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "Mediated request duration in seconds"
    );

    describe_gauge!(names::LOG_RECORDS, "Records currently held by the log store");

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

/// Record a completed mediated request.
pub fn record_request(resource: &str, action: &str, status: u16) {
    counter!(names::REQUESTS_TOTAL, "resource" => resource.to_string(), "action" => action.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record an abort.
pub fn record_abort(status: u16) {
    counter!(names::ABORTS_TOTAL, "status" => status.to_string()).increment(1);
}

/// Record a rate limit rejection. `scope` is `identity` or `ip`.
pub fn record_ratelimited(scope: &str) {
    counter!(names::RATELIMITED_TOTAL, "scope" => scope.to_string()).increment(1);
}

/// Record a failed request log write.
pub fn record_log_flush_failure() {
    counter!(names::LOG_FLUSH_FAILURES_TOTAL).increment(1);
}

// =============================================================================
// Histogram Recording Functions
// =============================================================================

/// Record mediated request duration.
pub fn record_duration(resource: &str, action: &str, duration_secs: f64) {
    histogram!(names::REQUEST_DURATION_SECONDS, "resource" => resource.to_string(), "action" => action.to_string())
        .record(duration_secs);
}

// =============================================================================
// Gauge Recording Functions
// =============================================================================

/// Update the log store size gauge.
pub fn set_log_records(count: u64) {
    // Precision loss above 2^53 records is irrelevant for a gauge.
    #[allow(clippy::cast_precision_loss)]
    gauge!(names::LOG_RECORDS).set(count as f64);
}
