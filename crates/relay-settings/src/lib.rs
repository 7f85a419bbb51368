//! # relay-settings
//!
//! Layered configuration for the relay server and chat client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.relay/settings.json` or an explicit path,
//!    deep-merged over defaults
//! 3. **Environment variables**: `RELAY_*` overrides
//!
//! The loaded value is passed down explicitly; there is no process-wide
//! singleton.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    RejectedOverride, apply_env_overrides, apply_overrides, deep_merge, load_settings,
    load_settings_from_path, load_settings_reporting, settings_path,
};
pub use types::{
    ClientSettings, HistorySettings, LoggingSettings, RelaySettings, ServerSettings,
    StoreSettings,
};
