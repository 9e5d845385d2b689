//! Per-frame routing: turns one inbound text frame into exactly one response.
//!
//! ```text
//! frame ──parse──► BridgeRequest ──gate──► Method ──invoke──► result
//!    │                  │                    │                  │
//!    ▼                  ▼                    ▼                  ▼
//! -32700 (id 0)    -32001 (id)         -32601 (id)       -32000 (id) / {id, result}
//! ```
//!
//! The gate runs before the method lookup: while the backend is down every
//! method except `bridge/status` and `ping` is refused with `-32001`, whether
//! or not the name is known.
//!
//! This module is pure with respect to I/O; the WebSocket server calls
//! [`handle_frame`] and writes whatever comes back.

use mesh_core::{
    decode_request, BridgeResponse, ErrorCode, ErrorObject, Method, RequestId, UNCORRELATED_ID,
};
use tracing::{debug, warn};

use crate::application::dispatch::DispatchTable;
use crate::domain::messages::Welcome;

/// Builds the welcome response sent once on every new connection.
pub fn welcome(mcp_connected: bool) -> BridgeResponse {
    let body = serde_json::to_value(Welcome::new(mcp_connected)).unwrap_or_default();
    BridgeResponse::success(UNCORRELATED_ID, body)
}

/// Builds the `-32700` reply for a frame that could not be read.
pub fn parse_error(detail: impl Into<String>) -> BridgeResponse {
    error_response(UNCORRELATED_ID, ErrorCode::ParseError, None, detail.into())
}

/// Handles one inbound frame and returns the single response it produces.
pub async fn handle_frame(dispatch: &DispatchTable, text: &str) -> BridgeResponse {
    // ── 1. Parse ──────────────────────────────────────────────────────────────
    let request = match decode_request(text) {
        Ok(request) => request,
        Err(e) => {
            warn!("unparsable frame: {e}");
            return parse_error(e.to_string());
        }
    };
    let id = request.id;
    let parsed = request.method.parse::<Method>();

    // ── 2. Connected gate ─────────────────────────────────────────────────────
    let exempt = matches!(parsed, Ok(method) if method.is_exempt());
    if !exempt && !dispatch.backend_connected() {
        debug!(id, method = %request.method, "refused: backend not connected");
        return BridgeResponse::failure(
            id,
            ErrorObject::new(ErrorCode::NotConnected, ErrorCode::NotConnected.default_message()),
        );
    }

    // ── 3. Lookup ─────────────────────────────────────────────────────────────
    let method = match parsed {
        Ok(method) => method,
        Err(unknown) => {
            debug!(id, "unknown method {}", unknown.0);
            let message = format!("Method not found: {}", unknown.0);
            return error_response(id, ErrorCode::MethodNotFound, Some(message), unknown.0);
        }
    };

    // ── 4. Invoke ─────────────────────────────────────────────────────────────
    match dispatch.invoke(method, request.params).await {
        Ok(result) => BridgeResponse::success(id, result),
        Err(e) => {
            warn!(id, %method, "handler failed: {e}");
            error_response(id, ErrorCode::InternalError, None, e.to_string())
        }
    }
}

fn error_response(
    id: RequestId,
    code: ErrorCode,
    message: Option<String>,
    data: String,
) -> BridgeResponse {
    let message = message.unwrap_or_else(|| code.default_message().to_string());
    BridgeResponse::failure(id, ErrorObject::new(code, message).with_data(data))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
