//! Export observability metrics
//!
//! Counters are emitted through the `metrics` facade and are no-ops until a recorder is
//! installed. [`init_metrics`] installs a Prometheus exporter when the CLI is given
//! `--metrics-addr`.

use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use tracing::{debug, info};

/// HTTP attempts issued to the spend API
pub const API_REQUESTS_TOTAL: &str = "api_requests_total";
/// 429 responses received
pub const API_RATE_LIMITED_TOTAL: &str = "api_rate_limited_total";
/// Retries after non rate-limit failures
pub const API_RETRIES_TOTAL: &str = "api_retries_total";
/// Events handled and recorded
pub const EVENTS_PROCESSED_TOTAL: &str = "events_processed_total";
/// Events that failed
pub const EVENTS_FAILED_TOTAL: &str = "events_failed_total";
/// Files written to blob storage
pub const ATTACHMENTS_UPLOADED_TOTAL: &str = "attachments_uploaded_total";
/// Attachments that could not be exported
pub const ATTACHMENTS_FAILED_TOTAL: &str = "attachments_failed_total";
/// Last persisted checkpoint index
pub const CHECKPOINT_INDEX: &str = "checkpoint_index";

static METRICS_ADDR: OnceCell<SocketAddr> = OnceCell::new();

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed or bound
    #[error("failed to install Prometheus exporter on {addr}: {reason}")]
    Install {
        /// Requested listen address
        addr: SocketAddr,
        /// Exporter message
        reason: String,
    },
}

/// Install the Prometheus exporter serving `/metrics` on `addr`.
///
/// Idempotent: later calls are ignored.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_ADDR.get() {
        debug!(addr = %existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install {
            addr,
            reason: e.to_string(),
        })?;
    let _ = METRICS_ADDR.set(addr);

    describe_counter!(API_REQUESTS_TOTAL, Unit::Count, "HTTP attempts issued to the spend API");
    describe_counter!(API_RATE_LIMITED_TOTAL, Unit::Count, "429 responses received");
    describe_counter!(API_RETRIES_TOTAL, Unit::Count, "Retries after failed attempts");
    describe_counter!(EVENTS_PROCESSED_TOTAL, Unit::Count, "Events exported");
    describe_counter!(EVENTS_FAILED_TOTAL, Unit::Count, "Events that failed");
    describe_counter!(ATTACHMENTS_UPLOADED_TOTAL, Unit::Count, "Files written to storage");
    describe_counter!(ATTACHMENTS_FAILED_TOTAL, Unit::Count, "Attachments that failed");
    describe_gauge!(CHECKPOINT_INDEX, Unit::Count, "Last persisted checkpoint index");

    info!(addr = %addr, "Metrics exporter listening");
    Ok(())
}

/// Count one HTTP attempt
pub fn record_api_request() {
    counter!(API_REQUESTS_TOTAL).increment(1);
}

/// Count one rate-limit wait
pub fn record_rate_limited() {
    counter!(API_RATE_LIMITED_TOTAL).increment(1);
}

/// Count one retry wait
pub fn record_retry() {
    counter!(API_RETRIES_TOTAL).increment(1);
}

/// Count one exported event
pub fn record_event_processed() {
    counter!(EVENTS_PROCESSED_TOTAL).increment(1);
}

/// Count one failed event
pub fn record_event_failed() {
    counter!(EVENTS_FAILED_TOTAL).increment(1);
}

/// Count uploaded files
pub fn record_attachments_uploaded(count: u64) {
    if count > 0 {
        counter!(ATTACHMENTS_UPLOADED_TOTAL).increment(count);
    }
}

/// Count failed attachments
pub fn record_attachments_failed(count: u64) {
    if count > 0 {
        counter!(ATTACHMENTS_FAILED_TOTAL).increment(count);
    }
}

/// Publish the last persisted checkpoint
pub fn record_checkpoint(index: usize) {
    gauge!(CHECKPOINT_INDEX).set(index as f64);
}
