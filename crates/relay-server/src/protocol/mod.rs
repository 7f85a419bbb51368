//! Chat protocol: session state and action dispatch.

pub mod engine;
pub mod session;

pub use engine::{EngineConfig, ProtocolEngine};
pub use session::{Session, SessionState};
