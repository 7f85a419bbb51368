//! Client-side error types.

use thiserror::Error;

/// Errors raised while establishing or driving a client connection.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection attempt failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The transport failed after it was open.
    #[error("transport error: {0}")]
    Transport(String),

    /// The supervisor task is gone.
    #[error("supervisor closed")]
    Closed,

    /// Outbound envelope could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ClientError> for relay_core::RelayError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Closed => Self::Closed,
            ClientError::Serialization(e) => Self::Serialization(e),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Convenience type alias for client results.
pub type Result<T> = std::result::Result<T, ClientError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use relay_core::RelayError;

    #[test]
    fn display() {
        assert_eq!(
            ClientError::Connect("refused".into()).to_string(),
            "connect failed: refused"
        );
        assert_eq!(ClientError::Closed.to_string(), "supervisor closed");
    }

    #[test]
    fn converts_into_relay_error() {
        assert_matches!(RelayError::from(ClientError::Closed), RelayError::Closed);
        assert_matches!(
            RelayError::from(ClientError::Connect("x".into())),
            RelayError::Transport(msg) if msg.contains("x")
        );
    }
}
