//! Chat messages and system notices.
//!
//! A [`Message`] is immutable once built. On the wire it is a flat JSON
//! object whose `type` field carries the [`MessageKind`], so the same value
//! doubles as the `message` / `system` server envelope.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{SYSTEM_USER_ID, SYSTEM_USERNAME};
use crate::ids::MessageId;

/// Whether a message was posted by a user or synthesized by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Ordinary user message.
    Message,
    /// Join/leave notice generated by the server.
    System,
}

impl MessageKind {
    /// Wire/storage spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "system" => Ok(Self::System),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// A single entry in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID.
    pub id: MessageId,
    /// Room the message belongs to.
    pub conversation_id: String,
    /// Author's client-asserted user ID (`"system"` for notices).
    pub user_id: String,
    /// Author's display name.
    pub username: String,
    /// Trimmed, non-empty body.
    pub content: String,
    /// `message` or `system`.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Creation instant.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a user message stamped now.
    pub fn chat(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            username: username.into(),
            content: content.into(),
            kind: MessageKind::Message,
            timestamp: Utc::now(),
        }
    }

    /// Build a system notice for a room.
    pub fn system(content: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            conversation_id: conversation_id.into(),
            user_id: SYSTEM_USER_ID.to_owned(),
            username: SYSTEM_USERNAME.to_owned(),
            content: content.into(),
            kind: MessageKind::System,
            timestamp: Utc::now(),
        }
    }

    /// Notice broadcast when `username` joins a room.
    pub fn joined_notice(username: &str, conversation_id: &str) -> Self {
        Self::system(format!("{username} has joined the chat"), conversation_id)
    }

    /// Notice broadcast when `username` leaves a room.
    pub fn left_notice(username: &str, conversation_id: &str) -> Self {
        Self::system(format!("{username} has left the chat"), conversation_id)
    }

    /// Whether this is a server-generated notice.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.kind == MessageKind::System
    }
}

/// Order messages oldest-first. Stable, so equal timestamps keep their
/// incoming relative order.
pub fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.timestamp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn chat_message_defaults() {
        let m = Message::chat("general", "u1", "alice", "hi");
        assert_eq!(m.kind, MessageKind::Message);
        assert_eq!(m.conversation_id, "general");
        assert!(!m.is_system());
    }

    #[test]
    fn system_notice_is_stamped_as_system() {
        let m = Message::left_notice("bob", "lobby");
        assert_eq!(m.user_id, "system");
        assert_eq!(m.username, "System");
        assert_eq!(m.content, "bob has left the chat");
        assert!(m.is_system());
    }

    #[test]
    fn wire_shape_uses_type_and_camel_case() {
        let m = Message::joined_notice("alice", "general");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["type"], "system");
        assert_eq!(v["conversationId"], "general");
        assert_eq!(v["content"], "alice has joined the chat");
        assert!(v.get("kind").is_none());
        let ts = v["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn wire_round_trip_preserves_identity_fields() {
        let m = Message::chat("room-7", "u9", "zoe", "hello there");
        let json = serde_json::to_string(&m).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, m.id);
        assert_eq!(back.conversation_id, m.conversation_id);
        assert_eq!(back.user_id, m.user_id);
        assert_eq!(back.username, m.username);
        assert_eq!(back.content, m.content);
        assert_eq!(back.kind, m.kind);
    }

    #[test]
    fn kind_parses_from_storage_spelling() {
        assert_eq!("system".parse::<MessageKind>(), Ok(MessageKind::System));
        assert_eq!("message".parse::<MessageKind>(), Ok(MessageKind::Message));
        assert!("shout".parse::<MessageKind>().is_err());
    }

    #[test]
    fn sort_chronologically_orders_oldest_first() {
        let mut a = Message::chat("r", "u", "n", "first");
        let mut b = Message::chat("r", "u", "n", "second");
        a.timestamp = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        b.timestamp = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 5).unwrap();
        let mut list = vec![b, a];
        sort_chronologically(&mut list);
        assert_eq!(list[0].content, "first");
        assert_eq!(list[1].content, "second");
    }
}
