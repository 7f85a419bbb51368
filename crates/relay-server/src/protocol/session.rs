//! Per-connection session state.

use std::fmt;

use relay_core::SessionId;
use relay_core::constants::{ANONYMOUS_USERNAME, DEFAULT_ROOM};
use tracing::debug;

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no identity yet.
    Anonymous,
    /// Has a non-empty user id.
    Identified,
    /// Has explicitly joined a room.
    Joined,
    /// Closed; terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Anonymous => "anonymous",
            Self::Identified => "identified",
            Self::Joined => "joined",
            Self::Closed => "closed",
        })
    }
}

/// Identity and room membership of one connection.
#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
    user_id: String,
    username: String,
    room_id: String,
    joined: bool,
    closed: bool,
}

impl Session {
    /// A fresh anonymous session in the default room.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            user_id: String::new(),
            username: ANONYMOUS_USERNAME.to_owned(),
            room_id: DEFAULT_ROOM.to_owned(),
            joined: false,
            closed: false,
        }
    }

    /// Session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Client-asserted user id (empty until identified).
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Display name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Current room.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// True iff the user id is non-empty.
    pub fn is_identified(&self) -> bool {
        !self.user_id.is_empty()
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.closed {
            SessionState::Closed
        } else if self.joined {
            SessionState::Joined
        } else if self.is_identified() {
            SessionState::Identified
        } else {
            SessionState::Anonymous
        }
    }

    /// Set (or overwrite) the identity.
    ///
    /// An absent user id falls back to the session id; an absent username to
    /// `"Anonymous"`. Returns the effective `(user_id, username)`. No-op on a
    /// closed session.
    pub fn identify(
        &mut self,
        user_id: Option<String>,
        username: Option<String>,
    ) -> (String, String) {
        if !self.closed {
            self.user_id = user_id.unwrap_or_else(|| self.id.to_string());
            self.username = username.unwrap_or_else(|| ANONYMOUS_USERNAME.to_owned());
        }
        (self.user_id.clone(), self.username.clone())
    }

    /// Move into `room_id`. Identity is kept. No-op on a closed session.
    pub fn join(&mut self, room_id: String) {
        if self.closed {
            return;
        }
        if !self.is_identified() {
            debug!(session_id = %self.id, room_id, "anonymous session joining room");
        }
        self.room_id = room_id;
        self.joined = true;
    }

    /// Mark closed. Returns `true` on the first call only.
    pub fn close(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }
}
