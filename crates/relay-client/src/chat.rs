//! Client-side view of a chat session, folded from server events.

use std::collections::BTreeSet;

use relay_core::{ControlEvent, Message, ServerEvent};

/// Reducer over [`ServerEvent`]s.
#[derive(Clone, Debug, Default)]
pub struct ChatState {
    client_id: Option<String>,
    user_id: Option<String>,
    username: Option<String>,
    identified: bool,
    conversation_id: Option<String>,
    messages: Vec<Message>,
    typing: BTreeSet<String>,
    last_error: Option<String>,
}

impl ChatState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the state.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Chat(message) => {
                if self.in_current_room(&message.conversation_id) {
                    let _ = self.typing.remove(&message.username);
                    self.messages.push(message.clone());
                }
            }
            ServerEvent::Control(control) => self.apply_control(control),
        }
    }

    fn apply_control(&mut self, control: &ControlEvent) {
        match control {
            ControlEvent::Connected { client_id, .. } => {
                self.client_id = Some(client_id.clone());
            }
            ControlEvent::Identified { user_id, username } => {
                self.user_id = Some(user_id.clone());
                self.username = Some(username.clone());
                self.identified = !user_id.is_empty();
            }
            ControlEvent::Joined { conversation_id } => {
                if self.conversation_id.as_deref() != Some(conversation_id.as_str()) {
                    self.messages.clear();
                }
                self.conversation_id = Some(conversation_id.clone());
                self.typing.clear();
            }
            ControlEvent::History {
                conversation_id,
                messages,
            } => {
                if self.in_current_room(conversation_id) {
                    self.messages.clone_from(messages);
                }
            }
            ControlEvent::Typing {
                username, is_typing, ..
            } => {
                if *is_typing {
                    let _ = self.typing.insert(username.clone());
                } else {
                    let _ = self.typing.remove(username);
                }
            }
            ControlEvent::Error { message } => {
                self.last_error = Some(message.clone());
            }
        }
    }

    /// Forget per-connection state after the link drops. Messages are kept.
    pub fn reset_connection(&mut self) {
        self.client_id = None;
        self.identified = false;
        self.typing.clear();
    }

    fn in_current_room(&self, conversation_id: &str) -> bool {
        self.conversation_id
            .as_deref()
            .is_none_or(|current| current == conversation_id)
    }

    /// Session id from the last `connected` greeting.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Effective user id after `identify`.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Effective username after `identify`.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Whether the server acknowledged a non-empty identity on this link.
    pub fn is_identified(&self) -> bool {
        self.identified
    }

    /// Room last joined.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Messages in the current room, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Usernames currently typing.
    pub fn typing(&self) -> impl Iterator<Item = &str> {
        self.typing.iter().map(String::as_str)
    }

    /// Most recent `error` reply.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn control(event: ControlEvent) -> ServerEvent {
        ServerEvent::Control(event)
    }

    fn joined(state: &mut ChatState, room: &str) {
        state.apply(&control(ControlEvent::Joined {
            conversation_id: room.into(),
        }));
    }

    #[test]
    fn identify_and_connect() {
        let mut state = ChatState::new();
        state.apply(&ServerEvent::connected("c1"));
        state.apply(&control(ControlEvent::Identified {
            user_id: "u1".into(),
            username: "alice".into(),
        }));
        assert_eq!(state.client_id(), Some("c1"));
        assert_eq!(state.username(), Some("alice"));
        assert!(state.is_identified());
    }

    #[test]
    fn empty_user_id_is_not_identified() {
        let mut state = ChatState::new();
        state.apply(&control(ControlEvent::Identified {
            user_id: String::new(),
            username: "Anonymous".into(),
        }));
        assert!(!state.is_identified());
    }

    #[test]
    fn history_replaces_and_messages_append() {
        let mut state = ChatState::new();
        joined(&mut state, "lobby");
        state.apply(&ServerEvent::Chat(Message::chat("lobby", "u", "a", "stale")));

        state.apply(&control(ControlEvent::History {
            conversation_id: "lobby".into(),
            messages: vec![
                Message::chat("lobby", "u", "a", "one"),
                Message::chat("lobby", "u", "a", "two"),
            ],
        }));
        state.apply(&ServerEvent::Chat(Message::joined_notice("bob", "lobby")));

        let contents: Vec<&str> = state.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "bob has joined the chat"]);
    }

    #[test]
    fn other_rooms_are_ignored() {
        let mut state = ChatState::new();
        joined(&mut state, "lobby");
        state.apply(&ServerEvent::Chat(Message::chat("elsewhere", "u", "a", "x")));
        state.apply(&control(ControlEvent::History {
            conversation_id: "elsewhere".into(),
            messages: vec![Message::chat("elsewhere", "u", "a", "y")],
        }));
        assert!(state.messages().is_empty());
    }

    #[test]
    fn switching_rooms_clears_messages() {
        let mut state = ChatState::new();
        joined(&mut state, "lobby");
        state.apply(&ServerEvent::Chat(Message::chat("lobby", "u", "a", "x")));
        joined(&mut state, "lobby");
        assert_eq!(state.messages().len(), 1);
        joined(&mut state, "red");
        assert!(state.messages().is_empty());
        assert_eq!(state.conversation_id(), Some("red"));
    }

    #[test]
    fn typing_set_tracks_indicators() {
        let mut state = ChatState::new();
        joined(&mut state, "lobby");
        for (name, on) in [("bob", true), ("carol", true), ("bob", false)] {
            state.apply(&control(ControlEvent::Typing {
                user_id: name.into(),
                username: name.into(),
                is_typing: on,
            }));
        }
        assert_eq!(state.typing().collect::<Vec<_>>(), ["carol"]);

        // A posted message ends the author's indicator.
        state.apply(&ServerEvent::Chat(Message::chat("lobby", "carol", "carol", "hi")));
        assert_eq!(state.typing().count(), 0);
    }

    #[test]
    fn error_and_reset() {
        let mut state = ChatState::new();
        state.apply(&ServerEvent::connected("c1"));
        state.apply(&ServerEvent::error("Please identify yourself first"));
        assert_eq!(state.last_error(), Some("Please identify yourself first"));

        state.reset_connection();
        assert_eq!(state.client_id(), None);
        assert!(!state.is_identified());
    }
}
