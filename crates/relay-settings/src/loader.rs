//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `RELAY_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{RelaySettings, home_dir};

/// Resolve the default settings file (`~/.relay/settings.json`).
pub fn settings_path() -> PathBuf {
    home_dir().join(".relay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid combination of
/// values is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    load_settings_reporting(path).map(|(settings, _)| settings)
}

/// Like [`load_settings_from_path`], but also returns the environment
/// overrides that were ignored, so a caller that loads settings before its
/// subscriber exists can log them afterwards.
pub fn load_settings_reporting(path: &Path) -> Result<(RelaySettings, Vec<RejectedOverride>)> {
    let mut settings = read_file_layer(path)?;
    let rejected = apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok((settings, rejected))
}

/// An environment override whose value failed to parse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedOverride {
    /// Variable name.
    pub key: String,
    /// Raw value as found.
    pub value: String,
    /// Expected type.
    pub kind: &'static str,
}

fn read_file_layer(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `RELAY_*` environment overrides to loaded settings.
///
/// Invalid values are ignored with a warning and returned.
pub fn apply_env_overrides(settings: &mut RelaySettings) -> Vec<RejectedOverride> {
    apply_overrides(settings, |name| std::env::var(name).ok())
}

/// Apply overrides from an arbitrary variable source.
pub fn apply_overrides<F>(settings: &mut RelaySettings, lookup: F) -> Vec<RejectedOverride>
where
    F: Fn(&str) -> Option<String>,
{
    let mut env = EnvSource {
        lookup,
        rejected: Vec::new(),
    };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("RELAY_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("RELAY_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }

    // ── Store ───────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_DB_PATH") {
        settings.store.db_path = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("RELAY_LOG_JSON") {
        settings.logging.json = v;
    }

    // ── Client ──────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_URL") {
        settings.client.url = v;
    }
    if let Some(v) = env.u32("RELAY_RECONNECT_ATTEMPTS", 0, 1000) {
        settings.client.reconnect_attempts = v;
    }
    if let Some(v) = env.u64("RELAY_RECONNECT_INTERVAL_MS", 10, 3_600_000) {
        settings.client.reconnect_interval_ms = v;
    }

    env.rejected
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers (thin wrappers) ────────────────────────────────────────

struct EnvSource<F> {
    lookup: F,
    rejected: Vec<RejectedOverride>,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(
        &mut self,
        name: &str,
        kind: &'static str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
            self.rejected.push(RejectedOverride {
                key: name.to_owned(),
                value: val,
                kind,
            });
        }
        result
    }

    fn bool(&mut self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&mut self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u32(&mut self, name: &str, min: u32, max: u32) -> Option<u32> {
        self.parsed(name, "u32", |v| parse_u32_range(v, min, max))
    }

    fn u64(&mut self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&mut self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
