//! Server configuration.

use relay_core::constants::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use relay_settings::RelaySettings;
use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// History paging bounds.
    pub history: HistoryLimits,
    /// Persist join/leave notices alongside user messages.
    pub persist_system_notices: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            history: HistoryLimits::default(),
            persist_system_notices: false,
        }
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            send_queue_capacity: server.send_queue_capacity,
            heartbeat_interval_secs: server.heartbeat_interval_secs,
            heartbeat_timeout_secs: server.heartbeat_timeout_secs,
            max_message_size: server.max_message_size,
            history: HistoryLimits {
                default_limit: settings.history.default_limit,
                max_limit: settings.history.max_limit,
            },
            persist_system_notices: settings.store.persist_system_notices,
        }
    }
}

/// Bounds applied to `history` requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLimits {
    /// Page size when the request has no `limit`.
    pub default_limit: u32,
    /// Upper clamp for `limit`.
    pub max_limit: u32,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_HISTORY_LIMIT,
            max_limit: MAX_HISTORY_LIMIT,
        }
    }
}

impl HistoryLimits {
    /// Clamp a requested page size into `[0, max_limit]`.
    ///
    /// Negative requests read as zero, i.e. an empty page.
    pub fn clamp_limit(&self, requested: Option<i64>) -> u32 {
        match requested {
            None => self.default_limit.min(self.max_limit),
            Some(n) => {
                let clamped = n.clamp(0, i64::from(self.max_limit));
                u32::try_from(clamped).unwrap_or(self.max_limit)
            }
        }
    }

    /// Clamp a requested offset to a non-negative row count.
    pub fn clamp_offset(requested: Option<i64>) -> u32 {
        let n = requested.unwrap_or(0).clamp(0, i64::from(u32::MAX));
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_host_and_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_limits() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_connections, 1024);
        assert_eq!(cfg.send_queue_capacity, 256);
        assert_eq!(cfg.heartbeat_interval_secs, 30);
        assert_eq!(cfg.heartbeat_timeout_secs, 90);
        assert_eq!(cfg.max_message_size, 64 * 1024);
        assert!(!cfg.persist_system_notices);
    }

    #[test]
    fn from_settings_copies_every_field() {
        let mut settings = RelaySettings::default();
        settings.server.port = 9000;
        settings.server.max_connections = 3;
        settings.history.max_limit = 20;
        settings.history.default_limit = 10;
        settings.store.persist_system_notices = true;

        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.max_connections, 3);
        assert_eq!(cfg.history.max_limit, 20);
        assert_eq!(cfg.history.default_limit, 10);
        assert!(cfg.persist_system_notices);
    }

    #[test]
    fn clamp_limit_cases() {
        let h = HistoryLimits::default();
        assert_eq!(h.clamp_limit(None), 50);
        assert_eq!(h.clamp_limit(Some(500)), 100);
        assert_eq!(h.clamp_limit(Some(-5)), 0);
        assert_eq!(h.clamp_limit(Some(0)), 0);
        assert_eq!(h.clamp_limit(Some(7)), 7);
    }

    #[test]
    fn clamp_offset_cases() {
        assert_eq!(HistoryLimits::clamp_offset(None), 0);
        assert_eq!(HistoryLimits::clamp_offset(Some(-3)), 0);
        assert_eq!(HistoryLimits::clamp_offset(Some(12)), 12);
        assert_eq!(HistoryLimits::clamp_offset(Some(i64::MAX)), u32::MAX);
    }

    proptest! {
        #[test]
        fn clamped_limit_is_always_in_range(n in any::<i64>(), max in 1u32..1000) {
            let h = HistoryLimits { default_limit: max, max_limit: max };
            let got = h.clamp_limit(Some(n));
            prop_assert!(got <= max);
            if n <= 0 {
                prop_assert_eq!(got, 0);
            }
            if n > 0 && n <= i64::from(max) {
                prop_assert_eq!(i64::from(got), n);
            }
        }
    }
}
