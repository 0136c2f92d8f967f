//! Infrastructure layer for dicomws-server.
//!
//! Everything that touches the network: binding the TCP listener, the
//! WebSocket handshake, per-connection tasks, and the registry of live
//! connections.
//!
//! Request semantics live in the application layer; configuration parsing
//! is done in `main.rs`.

pub mod session_registry;
pub mod ws_server;

pub use session_registry::{ActiveSession, SessionGuard, SessionId, SessionRegistry};
pub use ws_server::{Listener, ListenerError};
