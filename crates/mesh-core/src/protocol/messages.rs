//! JSON envelopes for the client-facing WebSocket protocol.
//!
//! Three shapes travel over a bridge WebSocket:
//!
//! ```json
//! {"id":7,"method":"memory/search","params":{"query":"dragon"}}      // request
//! {"id":7,"result":{"content":[]}}                                    // success response
//! {"id":7,"error":{"code":-32601,"message":"Method not found: x"}}    // error response
//! {"method":"mcp/status_changed","params":{"connected":false}}        // notification
//! ```
//!
//! Recipients tell notifications apart from responses by the absence of `id`.
//!
//! # Reserved id
//!
//! `id = 0` ([`UNCORRELATED_ID`]) marks a message that is not a reply to any
//! request (the welcome message and parse-error reports).  Callers must never
//! use `0` for a real request: a reply to it would be indistinguishable from
//! an uncorrelated message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-assigned request identifier.
pub type RequestId = i64;

/// The id carried by messages that do not answer a specific request.
pub const UNCORRELATED_ID: RequestId = 0;

// ── Requests ──────────────────────────────────────────────────────────────────

/// A request sent by a WebSocket client to the bridge.
///
/// `params` is opaque at this layer; each operation deserializes the shape it
/// needs.  A missing `params` field decodes as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl BridgeRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

// ── Error codes ───────────────────────────────────────────────────────────────

/// Stable, caller-visible error codes.
///
/// | Code   | Variant          | Meaning                                   |
/// |--------|------------------|-------------------------------------------|
/// | -32700 | `ParseError`     | malformed inbound frame                   |
/// | -32001 | `NotConnected`   | backend not connected                     |
/// | -32601 | `MethodNotFound` | unknown operation name                    |
/// | -32000 | `InternalError`  | handler raised an internal failure        |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    NotConnected,
    MethodNotFound,
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric wire value.
    pub const fn code(self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::NotConnected => -32001,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InternalError => -32000,
        }
    }

    /// Maps a numeric wire value back to a known code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -32700 => Some(ErrorCode::ParseError),
            -32001 => Some(ErrorCode::NotConnected),
            -32601 => Some(ErrorCode::MethodNotFound),
            -32000 => Some(ErrorCode::InternalError),
            _ => None,
        }
    }

    /// Human-readable message used when the caller has nothing more specific.
    pub const fn default_message(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::NotConnected => "Backend not connected",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InternalError => "Internal error",
        }
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl ErrorObject {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a detail string (failure message, offending method name, …).
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Returns the known [`ErrorCode`] for this error, if any.
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

impl std::fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(data) = &self.data {
            write!(f, ": {data}")?;
        }
        Ok(())
    }
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// A reply from the bridge, carrying exactly one of `result` or `error`.
///
/// The fields are private so the only way to build a response is through
/// [`BridgeResponse::success`] or [`BridgeResponse::failure`], which keeps the
/// "exactly one" rule out of reach of callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorObject>,
}

impl BridgeResponse {
    /// Builds a successful response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response.
    pub fn failure(id: RequestId, error: ErrorObject) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorObject> {
        self.error.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Converts the response into a `Result`.
    ///
    /// A decoded response whose `result` was JSON `null` arrives with neither
    /// member set; that is a success carrying `null`.
    pub fn into_outcome(self) -> Result<Value, ErrorObject> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ── Notifications ─────────────────────────────────────────────────────────────

/// An unsolicited, fire-and-forget message broadcast to every connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Any message a client may receive from the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Response(BridgeResponse),
    Notification(Notification),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
