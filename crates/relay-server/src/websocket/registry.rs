//! Live sessions and room-scoped fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock as SyncRwLock;
use relay_core::{ServerEvent, SessionId};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::BROADCAST_DROPS_TOTAL;
use crate::protocol::session::Session;

/// One attached session: its send side plus its mutable state.
#[derive(Debug)]
pub struct SessionEntry {
    /// Outbound queue for this session.
    pub connection: Arc<ClientConnection>,
    session: SyncRwLock<Session>,
}

impl SessionEntry {
    fn new(connection: Arc<ClientConnection>) -> Self {
        let session = Session::new(connection.id.clone());
        Self {
            connection,
            session: SyncRwLock::new(session),
        }
    }

    /// Session ID.
    pub fn id(&self) -> &SessionId {
        &self.connection.id
    }

    /// Copy of the current session state.
    ///
    /// The lock is released before returning, so the copy may be held across
    /// `.await` points.
    pub fn snapshot(&self) -> Session {
        self.session.read().clone()
    }

    /// Mutate the session under its lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.session.write())
    }

    fn room_is(&self, room_id: &str) -> bool {
        self.session.read().room_id() == room_id
    }

    /// Enqueue `frame` if the session is in `room_id`. `None` when it is not.
    ///
    /// The room check and the enqueue share one read lock, so the frame lands
    /// wholly before or wholly after a concurrent [`update`](Self::update).
    fn send_in_room(&self, room_id: &str, frame: &Arc<String>) -> Option<bool> {
        let session = self.session.read();
        (session.room_id() == room_id).then(|| self.connection.send(frame.clone()))
    }

    /// Enqueue a pre-serialized frame for this session only.
    pub fn send(&self, frame: Arc<String>) -> bool {
        self.connection.send(frame)
    }
}

/// Authoritative map from session id to live session.
///
/// `attach`/`detach` take the write lock and `broadcast` holds the read lock
/// for its whole pass, so a pass never sees a half-attached or half-detached
/// session. Sends are non-blocking `try_send`s into each recipient's queue,
/// which keeps per-recipient FIFO order.
pub struct Registry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create and store a session for `connection`.
    pub async fn attach(&self, connection: Arc<ClientConnection>) -> Arc<SessionEntry> {
        let entry = Arc::new(SessionEntry::new(connection));
        let mut sessions = self.sessions.write().await;
        let _ = sessions.insert(entry.id().clone(), entry.clone());
        debug!(session_id = %entry.id(), live = sessions.len(), "session attached");
        entry
    }

    /// Remove a session and close its connection.
    ///
    /// Returns the entry only to the caller that actually removed it; later
    /// calls for the same id return `None`.
    pub async fn detach(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        let removed = self.sessions.write().await.remove(id)?;
        let _ = removed.connection.close();
        debug!(session_id = %id, "session detached");
        Some(removed)
    }

    /// Look up a live session.
    pub async fn get(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Serialize `event` once and deliver it to every session in `room_id`,
    /// skipping `exclude`. Returns how many recipients accepted the frame.
    pub async fn broadcast(
        &self,
        event: &ServerEvent,
        room_id: &str,
        exclude: Option<&SessionId>,
    ) -> usize {
        let frame = match event.to_json() {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
                return 0;
            }
        };
        self.broadcast_frame(&frame, event.event_type(), room_id, exclude)
            .await
    }

    async fn broadcast_frame(
        &self,
        frame: &Arc<String>,
        event_type: &'static str,
        room_id: &str,
        exclude: Option<&SessionId>,
    ) -> usize {
        let sessions = self.sessions.read().await;
        let mut delivered = 0;
        for entry in sessions.values() {
            if exclude == Some(entry.id()) {
                continue;
            }
            let Some(accepted) = entry.send_in_room(room_id, frame) else {
                continue;
            };
            if accepted {
                delivered += 1;
            } else {
                counter!(BROADCAST_DROPS_TOTAL).increment(1);
                warn!(
                    session_id = %entry.id(),
                    event_type,
                    room_id,
                    dropped = entry.connection.drop_count(),
                    "failed to deliver to recipient"
                );
            }
        }
        debug!(event_type, room_id, delivered, "broadcast to room");
        delivered
    }

    /// Number of live sessions.
    pub async fn connection_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Number of distinct rooms with at least one live session.
    pub async fn room_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .map(|e| e.snapshot().room_id().to_owned())
            .collect::<HashSet<_>>()
            .len()
    }

    /// IDs of the sessions currently in `room_id`.
    pub async fn room_members(&self, room_id: &str) -> Vec<SessionId> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|e| e.room_is(room_id))
            .map(|e| e.id().clone())
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::Message;
    use tokio::sync::mpsc;

    fn make_connection(
        id: &str,
        capacity: usize,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(ClientConnection::new(SessionId::from(id), tx)), rx)
    }

    async fn attach_in(
        registry: &Registry,
        id: &str,
        room: &str,
    ) -> (Arc<SessionEntry>, mpsc::Receiver<Arc<String>>) {
        let (conn, rx) = make_connection(id, 32);
        let entry = registry.attach(conn).await;
        entry.update(|s| s.join(room.to_owned()));
        (entry, rx)
    }

    fn chat(room: &str) -> ServerEvent {
        ServerEvent::from(Message::chat(room, "u", "n", "hi"))
    }

    #[tokio::test]
    async fn attach_and_detach() {
        let registry = Registry::new();
        let (entry, _rx) = attach_in(&registry, "c1", "general").await;
        assert_eq!(registry.connection_count().await, 1);
        assert!(registry.get(entry.id()).await.is_some());

        assert!(registry.detach(entry.id()).await.is_some());
        assert_eq!(registry.connection_count().await, 0);
        assert!(entry.connection.is_closed());
    }

    #[tokio::test]
    async fn detach_is_idempotent() {
        let registry = Registry::new();
        let (entry, _rx) = attach_in(&registry, "c1", "general").await;
        assert!(registry.detach(entry.id()).await.is_some());
        assert!(registry.detach(entry.id()).await.is_none());
        assert!(registry.detach(&SessionId::from("never")).await.is_none());
    }

    #[tokio::test]
    async fn broadcast_is_room_scoped() {
        let registry = Registry::new();
        let (_a, mut rx_a) = attach_in(&registry, "a", "r1").await;
        let (_b, mut rx_b) = attach_in(&registry, "b", "r2").await;
        let (_c, mut rx_c) = attach_in(&registry, "c", "r1").await;

        assert_eq!(registry.broadcast(&chat("r1"), "r1", None).await, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_skips_excluded() {
        let registry = Registry::new();
        let (a, mut rx_a) = attach_in(&registry, "a", "r").await;
        let (_b, mut rx_b) = attach_in(&registry, "b", "r").await;

        assert_eq!(registry.broadcast(&chat("r"), "r", Some(a.id())).await, 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn detached_session_never_receives() {
        let registry = Registry::new();
        let (a, mut rx_a) = attach_in(&registry, "a", "r").await;
        let _ = registry.detach(a.id()).await;
        assert_eq!(registry.broadcast(&chat("r"), "r", None).await, 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_recipient_does_not_block_others() {
        let registry = Registry::new();
        let (slow, _slow_rx) = make_connection("slow", 1);
        let slow_entry = registry.attach(slow).await;
        let (_fast, mut fast_rx) = attach_in(&registry, "fast", "general").await;

        let _ = registry.broadcast(&chat("general"), "general", None).await;
        let delivered = registry.broadcast(&chat("general"), "general", None).await;
        assert_eq!(delivered, 1);
        assert_eq!(slow_entry.connection.drop_count(), 1);
        assert!(fast_rx.try_recv().is_ok());
        assert!(fast_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn per_recipient_order_is_fifo() {
        let registry = Registry::new();
        let (_a, mut rx) = attach_in(&registry, "a", "r").await;
        for i in 0..5 {
            let ev = ServerEvent::from(Message::chat("r", "u", "n", format!("m{i}")));
            let _ = registry.broadcast(&ev, "r", None).await;
        }
        for i in 0..5 {
            let frame = rx.try_recv().unwrap();
            let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(v["content"], format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn room_counts_and_members() {
        let registry = Registry::new();
        let (a, _ra) = attach_in(&registry, "a", "r1").await;
        let (_b, _rb) = attach_in(&registry, "b", "r1").await;
        let (_c, _rc) = attach_in(&registry, "c", "r2").await;
        assert_eq!(registry.room_count().await, 2);
        let mut members = registry.room_members("r1").await;
        members.sort_by(|x, y| x.as_str().cmp(y.as_str()));
        assert_eq!(members, vec![SessionId::from("a"), SessionId::from("b")]);

        let _ = registry.detach(a.id()).await;
        assert_eq!(registry.room_members("r1").await.len(), 1);
    }
}
