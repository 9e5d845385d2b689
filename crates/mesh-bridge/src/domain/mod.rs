//! Domain layer for mesh-bridge.
//!
//! Pure types with no dependencies on I/O, sockets, or processes:
//!
//! - Configuration structures
//! - The payloads the bridge itself produces (welcome, status, ping)
//!
//! Wire envelopes shared with the client live in `mesh-core`.

pub mod config;
pub mod messages;

pub use config::{BackendCommand, BridgeConfig};
pub use messages::{PingReply, StatusChanged, StatusSnapshot, Welcome};
