//! WebSocket transport: connections, registry, heartbeat, socket loop.

pub mod connection;
pub mod heartbeat;
pub mod registry;
pub mod session;

pub use connection::ClientConnection;
pub use registry::{Registry, SessionEntry};
pub use session::{CloseReason, run_ws_session};
