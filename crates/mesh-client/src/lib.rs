//! mesh-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does mesh-client do? (for beginners)
//!
//! The bridge speaks request/response over a single WebSocket, but replies
//! can come back in any order: a quick `ping` overtakes a slow graph search.
//! The client therefore tags each request with a fresh id and keeps a table
//! of requests still waiting for an answer.
//!
//! 1. [`BridgeClient::connect`] opens the WebSocket.
//! 2. [`BridgeClient::request`] sends `{id, method, params}` and waits until
//!    the reply with the same id arrives, or the deadline passes.
//! 3. Notifications pushed by the bridge (backend went down, bridge shutting
//!    down) are delivered to [`BridgeClient::subscribe_notifications`].
//! 4. [`MemoryApi`] wraps the MemoryMesh graph tools in typed methods.

pub mod correlator;
pub mod error;
pub mod memory;

pub use correlator::{BridgeClient, PendingReply, PendingTable, DEFAULT_TIMEOUT};
pub use error::ClientError;
pub use memory::{BridgeStatus, MemoryApi, Pong};
