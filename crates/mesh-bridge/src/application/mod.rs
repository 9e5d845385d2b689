//! Application layer for mesh-bridge.
//!
//! - [`backend`]: the `ToolBackend` seam and MemoryMesh graph operations
//! - [`dispatch`]: one handler per operation in the vocabulary
//! - [`router`]: the parse → gate → lookup → invoke pipeline for one frame

pub mod backend;
pub mod dispatch;
pub mod router;

pub use backend::{MemoryGraphExt, SessionError, ToolBackend};
pub use dispatch::{ConnectionCounter, DispatchTable, HandlerError};
pub use router::{handle_frame, parse_error, welcome};
