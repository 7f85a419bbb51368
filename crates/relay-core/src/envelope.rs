//! Wire envelopes exchanged over the duplex transport.
//!
//! Inbound frames are JSON objects tagged by `action`; outbound frames are
//! JSON objects tagged by `type`. Inbound parsing is deliberately lenient
//! about field types (a non-boolean `isTyping` reads as `false`, a non-string
//! `userId` reads as absent) and strict only about the frame being a JSON
//! object with a known action.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::{CONNECTED_GREETING, DEFAULT_ACTION};
use crate::message::Message;

/// Why an inbound frame could not be turned into a [`ClientAction`].
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Not valid JSON.
    #[error("invalid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Valid JSON, but not an object.
    #[error("envelope must be a JSON object")]
    NotAnObject,
    /// `action` names nothing the server understands.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

/// A client → server request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientAction {
    /// Assert an identity for this connection.
    Identify {
        /// Defaults to the session id when absent.
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        /// Defaults to `"Anonymous"` when absent.
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    /// Move into a room.
    Join {
        /// Defaults to `"general"` when absent.
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    /// Post to the current room.
    Message {
        /// Untrimmed body as sent.
        content: String,
    },
    /// Start/stop typing indicator.
    Typing {
        /// Whether the user is currently typing.
        is_typing: bool,
    },
    /// Request a page of room history.
    History {
        /// Defaults to the caller's current room.
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        /// Requested page size before clamping.
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<i64>,
        /// Rows to skip, newest-first.
        #[serde(skip_serializing_if = "Option::is_none")]
        offset: Option<i64>,
    },
}

impl ClientAction {
    /// Decode an inbound text frame.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(fields) = value else {
            return Err(EnvelopeError::NotAnObject);
        };
        Self::from_fields(&fields)
    }

    fn from_fields(fields: &Map<String, Value>) -> Result<Self, EnvelopeError> {
        let action = match fields.get("action") {
            None | Some(Value::Null) => DEFAULT_ACTION,
            Some(Value::String(s)) => s.as_str(),
            Some(other) => return Err(EnvelopeError::UnknownAction(other.to_string())),
        };

        let action = match action {
            "identify" => Self::Identify {
                user_id: string_field(fields, "userId"),
                username: string_field(fields, "username"),
            },
            "join" => Self::Join {
                conversation_id: string_field(fields, "conversationId"),
            },
            "message" => Self::Message {
                content: string_field(fields, "content").unwrap_or_default(),
            },
            "typing" => Self::Typing {
                is_typing: fields
                    .get("isTyping")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            "history" => Self::History {
                conversation_id: string_field(fields, "conversationId"),
                limit: fields.get("limit").and_then(Value::as_i64),
                offset: fields.get("offset").and_then(Value::as_i64),
            },
            other => return Err(EnvelopeError::UnknownAction(other.to_owned())),
        };
        Ok(action)
    }

    /// The `action` discriminator, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identify { .. } => "identify",
            Self::Join { .. } => "join",
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::History { .. } => "history",
        }
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Server → client control frames (everything except chat messages).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ControlEvent {
    /// First frame on every connection.
    Connected {
        /// The session id assigned at open.
        client_id: String,
        /// Human-readable greeting.
        message: String,
    },
    /// Reply to `identify`.
    Identified {
        /// Effective user id.
        user_id: String,
        /// Effective display name.
        username: String,
    },
    /// Reply to `join`.
    Joined {
        /// Room now joined.
        conversation_id: String,
    },
    /// A page of room history, oldest first.
    History {
        /// Room the page belongs to.
        conversation_id: String,
        /// Messages in chronological order.
        messages: Vec<Message>,
    },
    /// Typing indicator from another room member.
    Typing {
        /// Typist's user id.
        user_id: String,
        /// Typist's display name.
        username: String,
        /// Started (`true`) or stopped (`false`).
        is_typing: bool,
    },
    /// Policy violation reply.
    Error {
        /// What the caller did wrong.
        message: String,
    },
}

/// Any server → client frame.
///
/// `message` and `system` frames are the flattened [`Message`] itself; every
/// other frame is a [`ControlEvent`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerEvent {
    /// A chat message or system notice.
    Chat(Message),
    /// Any non-message frame.
    Control(ControlEvent),
}

impl ServerEvent {
    /// Greeting sent on open.
    pub fn connected(client_id: impl Into<String>) -> Self {
        Self::Control(ControlEvent::Connected {
            client_id: client_id.into(),
            message: CONNECTED_GREETING.to_owned(),
        })
    }

    /// Policy-violation reply.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Control(ControlEvent::Error {
            message: message.into(),
        })
    }

    /// The `type` discriminator, for logging and metrics labels.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chat(m) => m.kind.as_str(),
            Self::Control(c) => match c {
                ControlEvent::Connected { .. } => "connected",
                ControlEvent::Identified { .. } => "identified",
                ControlEvent::Joined { .. } => "joined",
                ControlEvent::History { .. } => "history",
                ControlEvent::Typing { .. } => "typing",
                ControlEvent::Error { .. } => "error",
            },
        }
    }

    /// Serialize to a text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode an outbound frame (client side).
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl From<Message> for ServerEvent {
    fn from(message: Message) -> Self {
        Self::Chat(message)
    }
}

impl From<ControlEvent> for ServerEvent {
    fn from(event: ControlEvent) -> Self {
        Self::Control(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn parse_identify_with_fields() {
        let a = ClientAction::parse(r#"{"action":"identify","userId":"u1","username":"al"}"#)
            .unwrap();
        assert_eq!(
            a,
            ClientAction::Identify {
                user_id: Some("u1".into()),
                username: Some("al".into()),
            }
        );
    }

    #[test]
    fn parse_identify_ignores_non_string_fields() {
        let a = ClientAction::parse(r#"{"action":"identify","userId":42}"#).unwrap();
        assert_eq!(
            a,
            ClientAction::Identify {
                user_id: None,
                username: None,
            }
        );
    }

    #[test]
    fn missing_action_defaults_to_message() {
        let a = ClientAction::parse(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(a, ClientAction::Message { content: "hi".into() });
    }

    #[test]
    fn typing_flag_defaults_false_when_invalid() {
        let a = ClientAction::parse(r#"{"action":"typing","isTyping":"yes"}"#).unwrap();
        assert_eq!(a, ClientAction::Typing { is_typing: false });
        let b = ClientAction::parse(r#"{"action":"typing"}"#).unwrap();
        assert_eq!(b, ClientAction::Typing { is_typing: false });
    }

    #[test]
    fn history_reads_signed_pagination() {
        let a =
            ClientAction::parse(r#"{"action":"history","limit":-5,"offset":3}"#).unwrap();
        assert_eq!(
            a,
            ClientAction::History {
                conversation_id: None,
                limit: Some(-5),
                offset: Some(3),
            }
        );
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert_matches!(
            ClientAction::parse("not json"),
            Err(EnvelopeError::Malformed(_))
        );
    }

    #[test]
    fn non_object_is_rejected() {
        assert_matches!(ClientAction::parse("[1,2]"), Err(EnvelopeError::NotAnObject));
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert_matches!(
            ClientAction::parse(r#"{"action":"dance"}"#),
            Err(EnvelopeError::UnknownAction(a)) if a == "dance"
        );
    }

    #[test]
    fn client_action_serializes_with_action_tag() {
        let v = serde_json::to_value(ClientAction::Join {
            conversation_id: Some("ops".into()),
        })
        .unwrap();
        assert_eq!(v, json!({"action": "join", "conversationId": "ops"}));

        let v = serde_json::to_value(ClientAction::Typing { is_typing: true }).unwrap();
        assert_eq!(v, json!({"action": "typing", "isTyping": true}));
    }

    #[test]
    fn serialized_action_parses_back() {
        let original = ClientAction::History {
            conversation_id: Some("r".into()),
            limit: Some(10),
            offset: None,
        };
        let text = serde_json::to_string(&original).unwrap();
        assert_eq!(ClientAction::parse(&text).unwrap(), original);
    }

    #[test]
    fn connected_event_shape() {
        let v = serde_json::to_value(ServerEvent::connected("c-1")).unwrap();
        assert_eq!(v["type"], "connected");
        assert_eq!(v["clientId"], "c-1");
        assert_eq!(v["message"], "Connected to chat server");
    }

    #[test]
    fn typing_event_shape() {
        let ev = ServerEvent::Control(ControlEvent::Typing {
            user_id: "u".into(),
            username: "n".into(),
            is_typing: true,
        });
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v, json!({"type":"typing","userId":"u","username":"n","isTyping":true}));
    }

    #[test]
    fn chat_frame_is_flat_message() {
        let m = Message::chat("general", "u1", "al", "yo");
        let v = serde_json::to_value(ServerEvent::from(m.clone())).unwrap();
        assert_eq!(v["type"], "message");
        assert_eq!(v["id"], m.id.as_str());
        assert_eq!(v["content"], "yo");
    }

    #[test]
    fn outbound_frames_parse_back_to_the_right_variant() {
        let m = Message::system("x joined", "general");
        let text = ServerEvent::from(m.clone()).to_json().unwrap();
        assert_eq!(ServerEvent::parse(&text).unwrap(), ServerEvent::Chat(m));

        let history = ServerEvent::Control(ControlEvent::History {
            conversation_id: "general".into(),
            messages: vec![Message::chat("general", "u", "n", "c")],
        });
        let text = history.to_json().unwrap();
        assert_eq!(ServerEvent::parse(&text).unwrap(), history);

        let err = ServerEvent::error("nope");
        assert_eq!(ServerEvent::parse(&err.to_json().unwrap()).unwrap(), err);
    }

    proptest::proptest! {
        #[test]
        fn parse_never_panics(text in ".{0,64}") {
            let _ = ClientAction::parse(&text);
        }

        #[test]
        fn message_content_survives_parse(content in "[a-zA-Z0-9 ]{0,32}") {
            let frame = serde_json::json!({"action": "message", "content": content}).to_string();
            let parsed = ClientAction::parse(&frame).unwrap();
            proptest::prop_assert_eq!(parsed, ClientAction::Message { content });
        }
    }

    #[test]
    fn event_type_names() {
        assert_eq!(ServerEvent::connected("c").event_type(), "connected");
        assert_eq!(ServerEvent::error("e").event_type(), "error");
        assert_eq!(
            ServerEvent::from(Message::system("s", "r")).event_type(),
            "system"
        );
    }
}
