//! Protocol module containing message types, the operation vocabulary, tool argument shaping, and the JSON codec.

pub mod codec;
pub mod jsonrpc;
pub mod messages;
pub mod method;
pub mod sequence;
pub mod tools;

pub use codec::CodecError;
pub use messages::*;
pub use method::{notifications, Method, UnknownMethod};
pub use sequence::SequenceCounter;
pub use tools::ToolInvocation;
