//! # mesh-core
//!
//! Shared library for the MemoryMesh bridge containing the wire protocol
//! types, the JSON codec, and the request-id sequence counter.
//!
//! This crate is used by both the bridge server and the correlating client.
//! It has no dependencies on async runtimes, sockets, or processes.
//!
//! # Architecture overview (for beginners)
//!
//! The bridge sits between two JSON protocols:
//!
//! ```text
//! WebSocket clients  ──(BridgeRequest / BridgeResponse / Notification)──►  mesh-bridge
//! mesh-bridge        ──(JSON-RPC 2.0, one message per line on stdio)────►  MemoryMesh process
//! ```
//!
//! - **`protocol::messages`** – the envelopes exchanged with WebSocket
//!   clients, plus the stable error codes.
//! - **`protocol::method`** – the closed vocabulary of operations a client
//!   may request.
//! - **`protocol::jsonrpc`** – the JSON-RPC 2.0 messages exchanged with the
//!   backend process over its standard input/output.
//! - **`protocol::codec`** – encoding/decoding helpers for both sides.
//! - **`protocol::sequence`** – the monotonically increasing id allocator.
//! - **`protocol::tools`** – how graph operations become MemoryMesh tool calls.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mesh_core::BridgeRequest` instead of `mesh_core::protocol::messages::BridgeRequest`.
pub use protocol::codec::{
    decode_line, decode_request, decode_server_message, encode_frame, encode_line, CodecError,
};
pub use protocol::messages::{
    BridgeRequest, BridgeResponse, ErrorCode, ErrorObject, Notification, RequestId,
    ServerMessage, UNCORRELATED_ID,
};
pub use protocol::method::{Method, UnknownMethod};
pub use protocol::sequence::SequenceCounter;
pub use protocol::tools::ToolInvocation;
