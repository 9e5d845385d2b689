//! Errors a request can complete with.

use std::time::Duration;

use mesh_core::{CodecError, ErrorObject, RequestId};
use thiserror::Error;

/// Why a client operation did not produce a result.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `connect()` has not succeeded, or the connection has since closed.
    #[error("not connected to the bridge")]
    NotConnected,

    /// The WebSocket could not be opened.
    #[error("connection failed: {0}")]
    Connection(String),

    /// No reply arrived before the request's deadline.
    #[error("request {id} timed out after {after:?}")]
    Timeout { id: RequestId, after: Duration },

    /// The bridge answered with an error object.
    #[error("bridge returned {0}")]
    Remote(ErrorObject),

    /// The client was dropped while the request was outstanding.
    #[error("client closed before the reply arrived")]
    Closed,

    /// A frame or a result could not be (de)serialized.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ClientError {
    /// Returns `true` for [`ClientError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}
