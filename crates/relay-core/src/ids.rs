//! Branded ID newtypes.
//!
//! Sessions and messages each get their own ID type so a message ID can never
//! be handed to something expecting a session. Fresh IDs are UUID v7
//! (time-ordered); IDs read back from storage or the wire keep whatever string
//! they arrived with.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifies one live connection's session; assigned at open, never reused.
    SessionId
}

branded_id! {
    /// Identifies a single chat message or system notice.
    MessageId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_new_is_uuid_v7() {
        let id = SessionId::new();
        let parsed = Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
        assert_ne!(SessionId::default(), SessionId::default());
    }

    #[test]
    fn from_str_ref_and_display() {
        let id = SessionId::from("abc-123");
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(format!("{id}"), "abc-123");
    }

    #[test]
    fn deref_to_str() {
        let id = MessageId::from("hello");
        let s: &str = &id;
        assert_eq!(s, "hello");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = MessageId::from("m-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"m-1\"");
        let back: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn into_inner_and_string_conversion() {
        assert_eq!(SessionId::from("s").into_inner(), "s");
        let s: String = MessageId::from("m").into();
        assert_eq!(s, "m");
    }
}
