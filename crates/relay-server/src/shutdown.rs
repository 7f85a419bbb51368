//! Shutdown: one token for the listener and every live session.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{info, warn};

/// Owns the relay's root cancellation token and tracks session tasks.
///
/// The listener stops accepting and each WebSocket session (watching a child
/// token) runs its close sequence once [`shutdown`](Self::shutdown) is called.
/// A session counts as live until its writer has flushed and sent the close
/// frame.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Coordinator with a fresh token.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the root token. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has begun. New upgrades are refused from here on.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Guard held by one session for its whole life, upgrade included.
    /// [`drain`](Self::drain) waits until every guard is dropped.
    pub fn session_guard(&self) -> TaskTrackerToken {
        self.sessions.token()
    }

    /// Sessions that have not finished yet.
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Cancel, then wait up to `timeout` for every tracked session to finish.
    /// Returns `true` if they all finished in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.shutdown();
        let _ = self.sessions.close();

        if tokio::time::timeout(timeout, self.sessions.wait()).await.is_ok() {
            info!("all sessions closed");
            true
        } else {
            warn!(
                live = self.sessions.len(),
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "sessions still open after drain timeout"
            );
            false
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
