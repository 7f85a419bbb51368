//! Transport seam between the supervisor and a concrete socket.
//!
//! A [`Connector`] produces one [`TransportLink`] per connection attempt. The
//! link is a pair of channels: outbound text frames go in, [`LinkEvent`]s come
//! out. Dropping or closing the link closes the underlying socket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use relay_core::ClientAction;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::errors::{ClientError, Result};

/// Something that happened on an open link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// An inbound text frame.
    Frame(String),
    /// The transport failed. No further events follow.
    Error(String),
    /// The peer closed the connection. No further events follow.
    Closed,
}

/// Sending half of an open link, handed to callbacks.
///
/// Holds a weak sender: only the [`TransportLink`] keeps the outbound stream
/// open, so an outbox kept past [`TransportLink::close`] just reports `false`.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::WeakUnboundedSender<String>,
}

impl Outbox {
    /// Encode and queue an action. Returns `false` if the link is gone.
    pub fn send(&self, action: &ClientAction) -> bool {
        match serde_json::to_string(action) {
            Ok(text) => self.send_text(text),
            Err(e) => {
                warn!(error = %e, action = action.name(), "failed to encode action");
                false
            }
        }
    }

    /// Queue a raw text frame.
    pub fn send_text(&self, text: String) -> bool {
        self.tx.upgrade().is_some_and(|tx| tx.send(text).is_ok())
    }
}

/// One open connection, expressed as channels.
#[derive(Debug)]
pub struct TransportLink {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

impl TransportLink {
    /// Wrap a pair of channel ends.
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Build a link plus the far ends of its channels. Used by in-process
    /// transports and tests.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<LinkEvent>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (Self::new(out_tx, in_rx), out_rx, in_tx)
    }

    /// Handle for queueing outbound frames.
    pub fn outbox(&self) -> Outbox {
        Outbox {
            tx: self.outbound.downgrade(),
        }
    }

    /// Next event. `None` means the link is gone without an explicit close.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.inbound.recv().await
    }

    /// Close the link. The far side observes its outbound receiver ending.
    pub fn close(self) {
        drop(self);
    }
}

/// Opens transport links.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Attempt one connection.
    async fn connect(&self) -> Result<TransportLink>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Clone, Debug)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Connector for a `ws://` or `wss://` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<TransportLink> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        debug!(url = %self.url, "websocket connected");

        let (link, mut out_rx, in_tx) = TransportLink::pair();
        let (mut sink, mut stream) = ws.split();

        drop(tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = out_rx.recv() => {
                        let Some(text) = outbound else {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        };
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            let _ = in_tx.send(LinkEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    inbound = stream.next() => match inbound {
                        Some(Ok(Message::Text(text))) => {
                            let _ = in_tx.send(LinkEvent::Frame(text.as_str().to_owned()));
                        }
                        Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                            Ok(text) => {
                                let _ = in_tx.send(LinkEvent::Frame(text));
                            }
                            Err(_) => debug!("dropping non-utf8 binary frame"),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            let _ = in_tx.send(LinkEvent::Closed);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = in_tx.send(LinkEvent::Error(e.to_string()));
                            break;
                        }
                    },
                }
            }
        }));

        Ok(link)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn outbox_encodes_actions() {
        let (link, mut out_rx, _in_tx) = TransportLink::pair();
        let outbox = link.outbox();
        assert!(outbox.send(&ClientAction::Join {
            conversation_id: Some("lobby".into()),
        }));

        let frame: serde_json::Value = serde_json::from_str(&out_rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["action"], "join");
        assert_eq!(frame["conversationId"], "lobby");
    }

    #[tokio::test]
    async fn close_ends_outbound_stream_despite_retained_outbox() {
        let (link, mut out_rx, _in_tx) = TransportLink::pair();
        let outbox = link.outbox();
        let kept = outbox.clone();
        link.close();

        assert!(out_rx.recv().await.is_none());
        assert!(!kept.send_text("late".into()));
        assert!(!outbox.send(&ClientAction::Join {
            conversation_id: None,
        }));
    }

    #[tokio::test]
    async fn recv_yields_injected_events() {
        let (mut link, _out_rx, in_tx) = TransportLink::pair();
        in_tx.send(LinkEvent::Frame("{}".into())).unwrap();
        in_tx.send(LinkEvent::Closed).unwrap();
        drop(in_tx);

        assert_matches!(link.recv().await, Some(LinkEvent::Frame(f)) if f == "{}");
        assert_matches!(link.recv().await, Some(LinkEvent::Closed));
        assert_matches!(link.recv().await, None);
    }

    #[tokio::test]
    async fn ws_connector_reports_refused_connection() {
        // Nothing listens on port 1.
        let connector = WsConnector::new("ws://127.0.0.1:1/ws");
        assert_matches!(connector.connect().await, Err(ClientError::Connect(_)));
    }
}
