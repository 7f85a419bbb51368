//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A recorder handle that is not installed globally (tests, embedding).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

// Metric name constants.

/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "relay_ws_connections_total";
/// WebSocket disconnections (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "relay_ws_disconnections_total";
/// Live WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "relay_ws_connections_active";
/// Upgrades refused at the connection cap (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "relay_ws_connections_rejected_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "relay_ws_connection_duration_seconds";
/// Inbound actions processed (counter, labels: action).
pub const ACTIONS_TOTAL: &str = "relay_actions_total";
/// Inbound frames that failed to decode (counter).
pub const FRAMES_REJECTED_TOTAL: &str = "relay_frames_rejected_total";
/// Chat messages accepted (counter).
pub const MESSAGES_TOTAL: &str = "relay_messages_total";
/// Per-recipient sends dropped during broadcast (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "relay_broadcast_drops_total";
/// Repository save failures (counter).
pub const PERSIST_FAILURES_TOTAL: &str = "relay_persist_failures_total";
/// Repository fetch failures (counter).
pub const HISTORY_FAILURES_TOTAL: &str = "relay_history_failures_total";
