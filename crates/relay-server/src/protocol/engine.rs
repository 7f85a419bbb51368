//! Action dispatch: the chat protocol proper.
//!
//! The engine owns no sockets. It reads decoded actions for a session, mutates
//! that session, and replies or broadcasts through the [`Registry`]. Repository
//! calls are awaited with no lock held, and their failures are logged without
//! affecting delivery.

use std::sync::Arc;

use metrics::counter;
use relay_core::constants::{DEFAULT_ROOM, IDENTIFY_FIRST};
use relay_core::message::sort_chronologically;
use relay_core::{ClientAction, ControlEvent, Message, ServerEvent, SessionId};
use relay_store::MessageRepository;
use tracing::{debug, info, instrument, warn};

use crate::config::{HistoryLimits, ServerConfig};
use crate::metrics::{
    ACTIONS_TOTAL, FRAMES_REJECTED_TOTAL, HISTORY_FAILURES_TOTAL, MESSAGES_TOTAL,
    PERSIST_FAILURES_TOTAL,
};
use crate::websocket::connection::ClientConnection;
use crate::websocket::registry::{Registry, SessionEntry};

/// Engine tunables.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineConfig {
    /// History paging bounds.
    pub history: HistoryLimits,
    /// Persist join/leave notices too.
    pub persist_system_notices: bool,
}

impl From<&ServerConfig> for EngineConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            history: config.history,
            persist_system_notices: config.persist_system_notices,
        }
    }
}

/// Dispatches client actions against the shared registry and repository.
pub struct ProtocolEngine {
    registry: Arc<Registry>,
    repository: Arc<dyn MessageRepository>,
    config: EngineConfig,
}

impl ProtocolEngine {
    /// Create an engine.
    pub fn new(
        registry: Arc<Registry>,
        repository: Arc<dyn MessageRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            repository,
            config,
        }
    }

    /// The registry this engine broadcasts through.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Start a session for a new connection.
    ///
    /// `connected` is queued before the session becomes visible to broadcast,
    /// so it is always the first frame the client sees.
    pub async fn open(&self, connection: Arc<ClientConnection>) -> Arc<SessionEntry> {
        let greeting = ServerEvent::connected(connection.id.as_str());
        if let Some(frame) = encode(&greeting) {
            let _ = connection.send(frame);
        }
        let entry = self.registry.attach(connection).await;
        info!(session_id = %entry.id(), "session opened");
        entry
    }

    /// Run the close sequence once.
    ///
    /// Returns `false` if the session was already closed. A session that had
    /// identified gets a "left" notice broadcast to its room.
    pub async fn close(&self, id: &SessionId) -> bool {
        let Some(entry) = self.registry.detach(id).await else {
            return false;
        };
        let session = entry.update(|s| {
            let _ = s.close();
            s.clone()
        });

        if session.is_identified() {
            let notice = Message::left_notice(session.username(), session.room_id());
            self.persist_notice(&notice).await;
            let _ = self
                .registry
                .broadcast(&ServerEvent::from(notice), session.room_id(), None)
                .await;
        }

        info!(
            session_id = %id,
            username = session.username(),
            age_ms = u64::try_from(entry.connection.age().as_millis()).unwrap_or(u64::MAX),
            "session closed"
        );
        true
    }

    /// Decode and dispatch one inbound text frame.
    ///
    /// Undecodable frames are logged and dropped with no reply.
    pub async fn handle_frame(&self, entry: &SessionEntry, text: &str) {
        match ClientAction::parse(text) {
            Ok(action) => self.dispatch(entry, action).await,
            Err(e) => {
                counter!(FRAMES_REJECTED_TOTAL).increment(1);
                warn!(session_id = %entry.id(), error = %e, "dropping undecodable frame");
            }
        }
    }

    /// Dispatch one decoded action.
    #[instrument(skip_all, fields(session_id = %entry.id(), action = action.name()))]
    pub async fn dispatch(&self, entry: &SessionEntry, action: ClientAction) {
        if entry.connection.is_closed() {
            debug!("ignoring action on closed session");
            return;
        }
        counter!(ACTIONS_TOTAL, "action" => action.name()).increment(1);

        match action {
            ClientAction::Identify { user_id, username } => self.identify(entry, user_id, username),
            ClientAction::Join { conversation_id } => self.join(entry, conversation_id).await,
            ClientAction::Message { content } => self.message(entry, &content).await,
            ClientAction::Typing { is_typing } => self.typing(entry, is_typing).await,
            ClientAction::History {
                conversation_id,
                limit,
                offset,
            } => {
                let room = conversation_id.unwrap_or_else(|| entry.snapshot().room_id().to_owned());
                let limit = self.config.history.clamp_limit(limit);
                let offset = HistoryLimits::clamp_offset(offset);
                self.send_history(entry, room, limit, offset).await;
            }
        }
    }

    fn identify(&self, entry: &SessionEntry, user_id: Option<String>, username: Option<String>) {
        let (user_id, username) = entry.update(|s| s.identify(user_id, username));
        info!(user_id = %user_id, username = %username, "client identified");
        reply(entry, &ServerEvent::Control(ControlEvent::Identified { user_id, username }));
    }

    async fn join(&self, entry: &SessionEntry, conversation_id: Option<String>) {
        let room = conversation_id.unwrap_or_else(|| DEFAULT_ROOM.to_owned());
        let joined = encode(&ServerEvent::Control(ControlEvent::Joined {
            conversation_id: room.clone(),
        }));
        // Queued under the session lock: room broadcasts that see the new
        // room are enqueued after it.
        let username = entry.update(|s| {
            s.join(room.clone());
            if let Some(frame) = joined {
                if !entry.send(frame) {
                    warn!(session_id = %entry.id(), "failed to enqueue joined reply");
                }
            }
            s.username().to_owned()
        });
        info!(room_id = %room, "client joined room");

        let notice = Message::joined_notice(&username, &room);
        self.persist_notice(&notice).await;
        let _ = self
            .registry
            .broadcast(&ServerEvent::from(notice), &room, Some(entry.id()))
            .await;

        let limit = self.config.history.clamp_limit(None);
        self.send_history(entry, room, limit, 0).await;
    }

    async fn message(&self, entry: &SessionEntry, content: &str) {
        let session = entry.snapshot();
        if !session.is_identified() {
            debug!("message from unidentified session rejected");
            reply(entry, &ServerEvent::error(IDENTIFY_FIRST));
            return;
        }

        let content = content.trim();
        if content.is_empty() {
            debug!("dropping empty message");
            return;
        }

        let message = Message::chat(
            session.room_id(),
            session.user_id(),
            session.username(),
            content,
        );
        if let Err(e) = self.repository.save(&message).await {
            counter!(PERSIST_FAILURES_TOTAL).increment(1);
            warn!(message_id = %message.id, error = %e, "failed to persist message");
        }

        counter!(MESSAGES_TOTAL).increment(1);
        let delivered = self
            .registry
            .broadcast(&ServerEvent::from(message), session.room_id(), None)
            .await;
        debug!(room_id = session.room_id(), delivered, "message broadcast");
    }

    async fn typing(&self, entry: &SessionEntry, is_typing: bool) {
        let session = entry.snapshot();
        let event = ServerEvent::Control(ControlEvent::Typing {
            user_id: session.user_id().to_owned(),
            username: session.username().to_owned(),
            is_typing,
        });
        let _ = self
            .registry
            .broadcast(&event, session.room_id(), Some(entry.id()))
            .await;
    }

    /// Reply with one page of history, oldest first.
    ///
    /// A repository failure is logged and answered with an empty page.
    async fn send_history(&self, entry: &SessionEntry, room: String, limit: u32, offset: u32) {
        let mut messages = match self
            .repository
            .fetch_by_conversation(&room, limit, offset)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                counter!(HISTORY_FAILURES_TOTAL).increment(1);
                warn!(room_id = %room, error = %e, "failed to load history");
                Vec::new()
            }
        };
        // Pages arrive newest first; reversing keeps same-instant messages in
        // insertion order through the stable sort.
        messages.reverse();
        sort_chronologically(&mut messages);
        debug!(room_id = %room, limit, offset, count = messages.len(), "sending history");

        reply(
            entry,
            &ServerEvent::Control(ControlEvent::History {
                conversation_id: room,
                messages,
            }),
        );
    }

    async fn persist_notice(&self, notice: &Message) {
        if !self.config.persist_system_notices {
            return;
        }
        if let Err(e) = self.repository.save(notice).await {
            counter!(PERSIST_FAILURES_TOTAL).increment(1);
            warn!(message_id = %notice.id, error = %e, "failed to persist system notice");
        }
    }
}

fn encode(event: &ServerEvent) -> Option<Arc<String>> {
    match event.to_json() {
        Ok(json) => Some(Arc::new(json)),
        Err(e) => {
            warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
            None
        }
    }
}

fn reply(entry: &SessionEntry, event: &ServerEvent) {
    let Some(frame) = encode(event) else { return };
    if !entry.send(frame) {
        warn!(session_id = %entry.id(), event_type = event.event_type(), "failed to enqueue reply");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
