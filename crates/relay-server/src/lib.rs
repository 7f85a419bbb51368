//! # relay-server
//!
//! WebSocket chat relay built on Axum.
//!
//! - **[`websocket`]**: per-connection send queues, the session [`Registry`],
//!   heartbeat, and the socket read/write loop
//! - **[`protocol`]**: the [`Session`] state machine and the
//!   [`ProtocolEngine`] that dispatches `identify` / `join` / `message` /
//!   `typing` / `history`
//! - **[`server`]**: routes (`/ws`, `/health`, `/metrics`), connection cap,
//!   graceful shutdown
//!
//! [`Registry`]: websocket::Registry
//! [`Session`]: protocol::Session
//! [`ProtocolEngine`]: protocol::ProtocolEngine

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{HistoryLimits, ServerConfig};
pub use protocol::{EngineConfig, ProtocolEngine};
pub use server::RelayServer;
pub use websocket::Registry;
