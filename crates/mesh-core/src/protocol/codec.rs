//! JSON codec for both sides of the bridge.
//!
//! # Backend side: newline-delimited JSON
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"initialize",...}\n
//! {"jsonrpc":"2.0","method":"notifications/initialized"}\n
//! ```
//!
//! `serde_json` escapes control characters inside strings, so an encoded
//! message never contains a raw `\n` and one line is always one message.
//!
//! # Client side: one JSON object per WebSocket text frame
//!
//! WebSocket already delimits messages, so a frame is just the JSON text.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::jsonrpc::JsonRpcMessage;
use crate::protocol::messages::{BridgeRequest, BridgeResponse, Notification, ServerMessage};

/// Errors that can occur while encoding or decoding a message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The text is not valid JSON, or does not have the expected shape.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON is well-formed but is not a message of the expected protocol.
    #[error("not a protocol message: {0}")]
    NotAMessage(String),

    /// A binary frame did not contain UTF-8 text.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
}

// ── Backend (stdio) side ──────────────────────────────────────────────────────

/// Encodes `msg` as one JSON line terminated by `\n`.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if `msg` cannot be serialized.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<Vec<u8>, CodecError> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes one line read from the backend.
///
/// Surrounding whitespace (including a trailing `\r`) is ignored.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for invalid JSON and
/// [`CodecError::NotAMessage`] for JSON that is not a JSON-RPC message.
pub fn decode_line(line: &str) -> Result<JsonRpcMessage, CodecError> {
    let value: Value = serde_json::from_str(line.trim())?;
    match JsonRpcMessage::classify(value) {
        Some(parsed) => Ok(parsed?),
        None => Err(CodecError::NotAMessage(truncate(line.trim()))),
    }
}

// ── Client (WebSocket) side ───────────────────────────────────────────────────

/// Encodes any wire message as the text of one WebSocket frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if `msg` cannot be serialized.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Converts the payload of a binary frame to text.
///
/// # Errors
///
/// Returns [`CodecError::InvalidUtf8`] if the bytes are not UTF-8.
pub fn frame_text(bytes: &[u8]) -> Result<&str, CodecError> {
    std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
}

/// Decodes a client request frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the text is not JSON or lacks `id`/`method`.
pub fn decode_request(text: &str) -> Result<BridgeRequest, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Decodes a frame received from the bridge.
///
/// A frame with an `id` is a response; a frame with a `method` and no `id`
/// is a notification.
///
/// # Errors
///
/// Returns [`CodecError`] if the frame is neither.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        return Err(CodecError::NotAMessage(truncate(text)));
    };

    if object.get("id").is_some_and(|id| !id.is_null()) {
        let response: BridgeResponse = serde_json::from_value(value)?;
        Ok(ServerMessage::Response(response))
    } else if object.contains_key("method") {
        let notification: Notification = serde_json::from_value(value)?;
        Ok(ServerMessage::Notification(notification))
    } else {
        Err(CodecError::NotAMessage(truncate(text)))
    }
}

/// Shortens text quoted in error messages.
fn truncate(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
