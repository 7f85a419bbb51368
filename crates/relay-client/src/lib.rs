//! # relay-client
//!
//! Client side of the chat relay.
//!
//! - [`ReconnectSupervisor`] owns one connection at a time and retries at a
//!   fixed interval after an unintended close
//! - [`WsConnector`] opens links over `tokio-tungstenite`
//! - [`ChatState`] folds server events into a view of the current room

#![deny(unsafe_code)]

pub mod chat;
pub mod errors;
pub mod supervisor;
pub mod transport;

pub use chat::ChatState;
pub use errors::{ClientError, Result};
pub use supervisor::{
    ConnectionStatus, ReconnectSupervisor, SupervisorConfig, SupervisorHandle, SupervisorHandler,
};
pub use transport::{Connector, LinkEvent, Outbox, TransportLink, WsConnector};
