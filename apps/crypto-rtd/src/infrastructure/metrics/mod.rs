//! Prometheus Metrics Module
//!
//! Exposes engine metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Counts of upstream frames, decode errors and handler failures
//! - **Sessions**: Connection state and reconnect attempts per exchange
//! - **Subscriptions**: Active consumer subscriptions and upstream streams
//! - **Polling**: Updates drained by the consumer
//! - **Snapshots**: One-shot REST requests by kind and outcome
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::{ConnectionState, Exchange, StreamKind};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frame counters
    describe_counter!(
        "crypto_rtd_frames_received_total",
        "Total text frames received from exchange sessions"
    );
    describe_counter!(
        "crypto_rtd_decode_errors_total",
        "Total frames that failed to decode"
    );
    describe_counter!(
        "crypto_rtd_handler_failures_total",
        "Total handler invocations that failed or panicked"
    );

    // Session gauges
    describe_gauge!(
        "crypto_rtd_session_state",
        "Session state (0 idle, 1 connecting, 2 open, 3 closing, 4 faulted)"
    );
    describe_counter!(
        "crypto_rtd_reconnects_total",
        "Total session reconnection attempts"
    );

    // Subscription gauges
    describe_gauge!(
        "crypto_rtd_subscriptions",
        "Number of active consumer subscriptions"
    );
    describe_gauge!(
        "crypto_rtd_active_streams",
        "Number of upstream streams with at least one subscriber"
    );

    // Polling
    describe_histogram!(
        "crypto_rtd_updates_drained",
        "Number of changed values returned per poll"
    );

    // Snapshots
    describe_counter!(
        "crypto_rtd_snapshot_requests_total",
        "Total one-shot REST requests by kind and outcome"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a text frame received from an exchange.
pub fn record_frame_received(exchange: Exchange) {
    counter!(
        "crypto_rtd_frames_received_total",
        "exchange" => exchange.as_str()
    )
    .increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_error(exchange: Exchange) {
    counter!(
        "crypto_rtd_decode_errors_total",
        "exchange" => exchange.as_str()
    )
    .increment(1);
}

/// Record a failed or panicking message handler.
pub fn record_handler_failure(exchange: Exchange) {
    counter!(
        "crypto_rtd_handler_failures_total",
        "exchange" => exchange.as_str()
    )
    .increment(1);
}

/// Update the session state gauge for an exchange.
pub fn set_session_state(exchange: Exchange, state: ConnectionState) {
    gauge!(
        "crypto_rtd_session_state",
        "exchange" => exchange.as_str()
    )
    .set(f64::from(state.code()));
}

/// Record a session reconnection attempt.
pub fn record_reconnect(exchange: Exchange) {
    counter!(
        "crypto_rtd_reconnects_total",
        "exchange" => exchange.as_str()
    )
    .increment(1);
}

/// Update the active consumer subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_subscriptions(count: usize) {
    gauge!("crypto_rtd_subscriptions").set(count as f64);
}

/// Update the active upstream stream count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_streams(count: usize) {
    gauge!("crypto_rtd_active_streams").set(count as f64);
}

/// Record the number of updates returned by one poll.
#[allow(clippy::cast_precision_loss)]
pub fn record_updates_drained(count: usize) {
    histogram!("crypto_rtd_updates_drained").record(count as f64);
}

/// Record a one-shot snapshot request.
pub fn record_snapshot_request(kind: StreamKind, ok: bool) {
    counter!(
        "crypto_rtd_snapshot_requests_total",
        "kind" => kind.as_str(),
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
