//! # relay-core
//!
//! Foundation types shared by every relay crate:
//!
//! - **Branded IDs**: [`SessionId`] and [`MessageId`] newtypes
//! - **Messages**: [`Message`] with its [`MessageKind`] (`message` / `system`)
//! - **Envelopes**: inbound [`ClientAction`] and outbound [`ServerEvent`]
//! - **Errors**: [`RelayError`] and [`EnvelopeError`] via `thiserror`
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod constants;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod message;

pub use envelope::{ClientAction, ControlEvent, EnvelopeError, ServerEvent};
pub use errors::{RelayError, Result};
pub use ids::{MessageId, SessionId};
pub use message::{Message, MessageKind};
