//! Error hierarchy shared by the relay crates.
//!
//! [`RelayError`] is the top-level type returned across crate boundaries by
//! the server and client. Storage and settings failures have their own enums
//! in their crates and are carried here as strings so `relay-core` stays at
//! the bottom of the dependency graph.

use thiserror::Error;

use crate::envelope::EnvelopeError;

/// Top-level relay error.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Inbound frame could not be decoded.
    #[error("{0}")]
    Envelope(#[from] EnvelopeError),

    /// Outbound value could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// History persistence or lookup failed.
    #[error("storage: {0}")]
    Storage(String),

    /// The duplex transport faulted.
    #[error("transport: {0}")]
    Transport(String),

    /// The peer or local side already closed the connection.
    #[error("connection closed")]
    Closed,

    /// Configuration could not be loaded or is invalid.
    #[error("configuration: {0}")]
    Config(String),

    /// Anything else.
    #[error("internal: {0}")]
    Internal(String),
}

impl RelayError {
    /// Short machine-readable code, used as a metrics label and log field.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Envelope(_) => "envelope",
            Self::Serialization(_) => "serialization",
            Self::Storage(_) => "storage",
            Self::Transport(_) => "transport",
            Self::Closed => "closed",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether retrying the same operation could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Storage(_))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RelayError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ClientAction;
    use assert_matches::assert_matches;

    #[test]
    fn envelope_error_converts() {
        let err: RelayError = ClientAction::parse("[]").unwrap_err().into();
        assert_matches!(err, RelayError::Envelope(EnvelopeError::NotAnObject));
        assert_eq!(err.code(), "envelope");
        assert!(!err.is_transient());
    }

    #[test]
    fn display_includes_context() {
        let err = RelayError::Transport("reset by peer".into());
        assert_eq!(err.to_string(), "transport: reset by peer");
        assert!(err.is_transient());
    }

    #[test]
    fn closed_has_stable_code() {
        assert_eq!(RelayError::Closed.code(), "closed");
        assert_eq!(RelayError::Closed.to_string(), "connection closed");
    }
}
