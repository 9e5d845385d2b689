//! Infrastructure layer for mesh-bridge.
//!
//! The infrastructure layer handles all I/O: the MemoryMesh child process,
//! WebSocket connections from clients, and the settings file.
//!
//! # Responsibilities
//!
//! - Spawning the backend and speaking MCP over its stdio
//! - Binding the TCP listener and performing WebSocket upgrades
//! - Tracking open connections for replies and broadcasts
//! - Reading the optional TOML settings file
//! - Ordered shutdown when the `running` flag is cleared
//!
//! # What does NOT belong here?
//!
//! - Deciding what a request means (application layer)
//! - Payload type definitions (domain layer)
//! - Command-line parsing (`main.rs`)

pub mod backend_session;
pub mod registry;
pub mod storage;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use backend_session::BackendSession;
pub use registry::{ConnectionId, ConnectionRegistry};
pub use ws_server::{run_server, BridgeServer};
