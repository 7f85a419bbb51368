//! Settings sections.
//!
//! Every section is `#[serde(default)]` so a settings file only needs the
//! keys it changes.

use std::path::PathBuf;
use std::time::Duration;

use relay_core::constants::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener and per-connection limits.
    pub server: ServerSettings,
    /// History persistence.
    pub store: StoreSettings,
    /// History paging.
    pub history: HistorySettings,
    /// Chat client.
    pub client: ClientSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_timeout_secs < self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutSecs must not be shorter than the interval".into(),
            ));
        }
        if self.history.default_limit > self.history.max_limit {
            return Err(SettingsError::InvalidValue(
                "history.defaultLimit exceeds history.maxLimit".into(),
            ));
        }
        if self.store.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "store.poolSize must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (0 picks an ephemeral port).
    pub port: u16,
    /// Upgrades beyond this many live connections are refused.
    pub max_connections: usize,
    /// Outbound frames buffered per connection before sends are dropped.
    pub send_queue_capacity: usize,
    /// Ping cadence.
    pub heartbeat_interval_secs: u64,
    /// Silence after which a connection is considered dead.
    pub heartbeat_timeout_secs: u64,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 1024,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
        }
    }
}

/// History persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// `SQLite` file path. A leading `~/` expands to `$HOME`.
    pub db_path: String,
    /// Pooled connections.
    pub pool_size: u32,
    /// `busy_timeout` pragma, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Also persist join/leave notices.
    pub persist_system_notices: bool,
}

impl StoreSettings {
    /// `db_path` with `~/` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        match self.db_path.strip_prefix("~/") {
            Some(rest) => home_dir().join(rest),
            None => PathBuf::from(&self.db_path),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "~/.relay/relay.db".to_string(),
            pool_size: 8,
            busy_timeout_ms: 5000,
            persist_system_notices: false,
        }
    }
}

/// History paging limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistorySettings {
    /// Page size when the request omits `limit`.
    pub default_limit: u32,
    /// Largest page served.
    pub max_limit: u32,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_HISTORY_LIMIT,
            max_limit: MAX_HISTORY_LIMIT,
        }
    }
}

/// Chat client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Server endpoint.
    pub url: String,
    /// Automatic reconnect attempts after an unintended close.
    pub reconnect_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub reconnect_interval_ms: u64,
}

impl ClientSettings {
    /// `reconnect_interval_ms` as a [`Duration`].
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            reconnect_attempts: 5,
            reconnect_interval_ms: 3000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

pub(crate) fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
