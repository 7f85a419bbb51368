//! # relay-store
//!
//! Message history for the relay.
//!
//! [`MessageRepository`] is the async contract the protocol engine depends
//! on. Two implementations ship here:
//!
//! - [`SqliteMessageRepository`]: pooled `SQLite` with embedded migrations
//! - [`MemoryMessageRepository`]: a process-local vector, for tests and
//!   `--in-memory` runs

#![deny(unsafe_code)]

pub mod errors;
pub mod repository;
pub mod sqlite;

pub use errors::{Result, StoreError};
pub use repository::{MemoryMessageRepository, MessageRepository};
pub use sqlite::{ConnectionConfig, SqliteMessageRepository};
