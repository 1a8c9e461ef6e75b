//! Prometheus metrics recorder and `/metrics` endpoint support.

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_all();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from a recorder handle.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

fn describe_all() {
    describe_counter!(WS_CONNECTIONS_TOTAL, "WebSocket connections accepted");
    describe_counter!(WS_DISCONNECTIONS_TOTAL, "WebSocket connections torn down, by reason");
    describe_gauge!(WS_CONNECTIONS_ACTIVE, "WebSocket connections currently open");
    describe_histogram!(
        WS_CONNECTION_DURATION_SECONDS,
        Unit::Seconds,
        "Lifetime of a WebSocket connection"
    );
    describe_counter!(RELAY_MESSAGES_RECEIVED_TOTAL, "Messages decoded and queued");
    describe_counter!(RELAY_DECODE_ERRORS_TOTAL, "Inbound payloads that failed to decode");
    describe_counter!(RELAY_BROADCASTS_TOTAL, "Broadcast passes completed");
    describe_counter!(RELAY_DELIVERIES_TOTAL, "Frames written to clients");
    describe_counter!(RELAY_DELIVERY_FAILURES_TOTAL, "Writes that failed or timed out, by reason");
    describe_histogram!(
        RELAY_BROADCAST_DURATION_SECONDS,
        Unit::Seconds,
        "Time to fan one message out to every client"
    );
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Messages received and queued total (counter).
pub const RELAY_MESSAGES_RECEIVED_TOTAL: &str = "relay_messages_received_total";
/// Malformed inbound payloads total (counter).
pub const RELAY_DECODE_ERRORS_TOTAL: &str = "relay_decode_errors_total";
/// Broadcast passes total (counter).
pub const RELAY_BROADCASTS_TOTAL: &str = "relay_broadcasts_total";
/// Successful per-client deliveries total (counter).
pub const RELAY_DELIVERIES_TOTAL: &str = "relay_deliveries_total";
/// Failed per-client deliveries total (counter, labels: reason).
pub const RELAY_DELIVERY_FAILURES_TOTAL: &str = "relay_delivery_failures_total";
/// Broadcast pass duration seconds (histogram).
pub const RELAY_BROADCAST_DURATION_SECONDS: &str = "relay_broadcast_duration_seconds";
