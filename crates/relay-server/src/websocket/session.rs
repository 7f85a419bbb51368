//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::SessionId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::protocol::ProtocolEngine;

/// Upper bound on the writer's final flush once the session has closed.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a session's read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    /// Read or write on the socket failed.
    TransportError,
    /// No inbound activity within the heartbeat timeout.
    HeartbeatTimeout,
    /// Server shutting down.
    Shutdown,
}

impl CloseReason {
    /// Metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::TransportError => "transport_error",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Run a WebSocket session for a connected client.
///
/// 1. Opens a session (the client receives `connected` first)
/// 2. Feeds text and UTF-8 binary frames to the protocol engine, in order
/// 3. Forwards queued outbound frames and sends periodic pings
/// 4. Ends on peer close, transport fault, heartbeat timeout, or shutdown
/// 5. Runs the engine's close sequence exactly once, then flushes queued
///    frames and sends a close frame
#[instrument(skip_all, fields(session_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    engine: Arc<ProtocolEngine>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();

    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity.max(1));
    let session_id = SessionId::new();
    let _ = tracing::Span::current().record("session_id", tracing::field::display(&session_id));
    let connection = Arc::new(ClientConnection::new(session_id.clone(), send_tx));

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let entry = engine.open(connection.clone()).await;

    let interval = Duration::from_secs(config.heartbeat_interval_secs.max(1));
    let timeout = Duration::from_secs(config.heartbeat_timeout_secs.max(1));
    let cancel = shutdown.child_token();

    let mut heartbeat = tokio::spawn(run_heartbeat(
        connection.clone(),
        interval,
        timeout,
        cancel.clone(),
    ));

    // Cancelled only after the close sequence has queued its frames.
    let writer_cancel = CancellationToken::new();
    let mut outbound = tokio::spawn(write_outbound(
        ws_tx,
        send_rx,
        interval,
        writer_cancel.clone(),
    ));

    let mut outbound_done = false;
    let reason = loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read failed");
                        break CloseReason::TransportError;
                    }
                    None => break CloseReason::PeerClosed,
                };
                connection.mark_alive();

                let text = match msg {
                    Message::Text(ref t) => t.as_str().to_owned(),
                    Message::Binary(ref data) => {
                        if let Ok(s) = std::str::from_utf8(data) {
                            s.to_owned()
                        } else {
                            info!(len = data.len(), "dropping non-UTF-8 binary frame");
                            continue;
                        }
                    }
                    Message::Close(_) => {
                        debug!("client sent close frame");
                        break CloseReason::PeerClosed;
                    }
                    Message::Ping(_) | Message::Pong(_) => continue,
                };

                engine.handle_frame(&entry, &text).await;
            }
            result = &mut heartbeat => {
                match result {
                    Ok(HeartbeatResult::TimedOut) => {
                        warn!(
                            timeout_secs = timeout.as_secs(),
                            "client unresponsive, disconnecting"
                        );
                        break CloseReason::HeartbeatTimeout;
                    }
                    _ => break CloseReason::Shutdown,
                }
            }
            _ = &mut outbound => {
                outbound_done = true;
                if shutdown.is_cancelled() {
                    break CloseReason::Shutdown;
                }
                warn!("websocket write failed");
                break CloseReason::TransportError;
            }
            () = shutdown.cancelled() => break CloseReason::Shutdown,
        }
    };

    cancel.cancel();
    let _ = engine.close(&session_id).await;
    writer_cancel.cancel();

    info!(reason = reason.as_str(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());

    heartbeat.abort();
    if !outbound_done {
        // Let the writer flush and send its close frame.
        let _ = tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut outbound).await;
    }
    outbound.abort();
}

/// Forward queued frames to the socket and ping on `interval`.
///
/// On cancel, frames already queued are written before the close frame.
async fn write_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ping_interval = tokio::time::interval(interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                while let Ok(text) = send_rx.try_recv() {
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        return;
                    }
                }
                break;
            }
            frame = send_rx.recv() => {
                let Some(text) = frame else { break };
                if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                    return;
                }
            }
            _ = ping_interval.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    // The socket loop itself is driven end to end in tests/integration.rs.

    #[test]
    fn close_reason_labels_are_distinct() {
        let labels = [
            CloseReason::PeerClosed,
            CloseReason::TransportError,
            CloseReason::HeartbeatTimeout,
            CloseReason::Shutdown,
        ]
        .map(CloseReason::as_str);
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
