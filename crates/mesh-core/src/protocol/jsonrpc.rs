//! JSON-RPC 2.0 messages exchanged with the backend tool provider.
//!
//! The backend (MemoryMesh) is a Model Context Protocol server.  It reads one
//! JSON object per line on standard input and writes one JSON object per line
//! on standard output.  Three message kinds exist:
//!
//! | Kind          | `id` | `method` | Example                                            |
//! |---------------|------|----------|----------------------------------------------------|
//! | Request       | yes  | yes      | `{"jsonrpc":"2.0","id":2,"method":"tools/list"}`   |
//! | Notification  | no   | yes      | `{"jsonrpc":"2.0","method":"notifications/initialized"}` |
//! | Response      | yes  | no       | `{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}`   |
//!
//! Ids are kept as raw [`Value`]s because the backend may use strings for the
//! requests *it* sends; the bridge itself always uses integers.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON-RPC version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision announced during the handshake.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Backend method names.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const PING: &str = "ping";
}

/// JSON-RPC "method not found", used when the backend asks us for something
/// we do not implement.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A request (expects a response with the same id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Value::from(id),
            method: method.into(),
            params,
        }
    }
}

/// A notification (no response).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: None,
        }
    }
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A response to an earlier request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Returns `true` when this response answers the request numbered `id`.
    pub fn answers(&self, id: i64) -> bool {
        self.id.as_i64() == Some(id)
    }

    /// Splits the response into its outcome; a missing `result` is `null`.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Any message read from the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Classifies a decoded JSON object by which of `id` / `method` it carries.
    ///
    /// Returns `None` if the value is not an object or carries neither member.
    pub fn classify(value: Value) -> Option<Result<Self, serde_json::Error>> {
        let object = value.as_object()?;
        let has_method = object.contains_key("method");
        let has_id = object.get("id").is_some_and(|id| !id.is_null());

        let parsed = match (has_method, has_id) {
            (true, true) => serde_json::from_value(value).map(JsonRpcMessage::Request),
            (true, false) => serde_json::from_value(value).map(JsonRpcMessage::Notification),
            (false, true) => serde_json::from_value(value).map(JsonRpcMessage::Response),
            (false, false) => return None,
        };
        Some(parsed)
    }
}

/// Builds the params of the `initialize` request.
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": client_name,
            "version": client_version,
        },
    })
}

/// Builds the params of a `tools/call` request.
pub fn tool_call_params(name: &str, arguments: Value) -> Value {
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    json!({ "name": name, "arguments": arguments })
}
