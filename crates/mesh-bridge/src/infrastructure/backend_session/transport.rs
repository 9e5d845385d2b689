//! Stdio transport and MCP client state for the backend process.
//!
//! [`StdioTransport`] owns the child's stdin and a line reader over its
//! stdout.  [`McpClient`] adds request ids and the JSON-RPC exchange on top:
//! write one request line, then read lines until the matching response
//! arrives, dealing with whatever else the backend says in between.
//!
//! Only one exchange runs at a time; the session keeps the client behind an
//! async mutex for the whole write/read cycle.

use mesh_core::protocol::jsonrpc::{
    initialize_params, methods, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, METHOD_NOT_FOUND,
};
use mesh_core::{decode_line, encode_line, SequenceCounter};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{ChildStdin, ChildStdout};
use tracing::{debug, warn};

use crate::application::backend::SessionError;

/// `clientInfo.name` announced in the handshake.
pub const CLIENT_NAME: &str = "memorymesh-bridge";

// ── Transport ─────────────────────────────────────────────────────────────────

/// Newline-delimited JSON over a child's stdin/stdout.
pub struct StdioTransport {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl StdioTransport {
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            stdin,
            stdout: BufReader::new(stdout).lines(),
        }
    }

    /// Writes one message as a single line and flushes.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> Result<(), SessionError> {
        let bytes = encode_line(msg).map_err(|e| SessionError::Connection(e.to_string()))?;
        self.stdin
            .write_all(&bytes)
            .await
            .map_err(|e| io_error("write to backend stdin", e))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| io_error("flush backend stdin", e))
    }

    /// Reads the next non-empty line; `Connection` on EOF.
    pub async fn next_line(&mut self) -> Result<String, SessionError> {
        loop {
            match self.stdout.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Ok(line),
                Ok(None) => {
                    return Err(SessionError::Connection(
                        "backend closed its stdout".to_string(),
                    ))
                }
                Err(e) => return Err(io_error("read from backend stdout", e)),
            }
        }
    }

    /// Flushes and closes stdin; the stdout reader is dropped with `self`.
    pub async fn close(mut self) {
        if let Err(e) = self.stdin.shutdown().await {
            debug!("closing backend stdin: {e}");
        }
    }
}

fn io_error(action: &str, e: std::io::Error) -> SessionError {
    SessionError::Connection(format!("failed to {action}: {e}"))
}

// ── MCP client ────────────────────────────────────────────────────────────────

/// JSON-RPC request/response exchange over a [`StdioTransport`].
pub struct McpClient {
    transport: StdioTransport,
    ids: SequenceCounter,
}

impl McpClient {
    pub fn new(transport: StdioTransport) -> Self {
        Self {
            transport,
            ids: SequenceCounter::new(),
        }
    }

    /// Runs `initialize` followed by `notifications/initialized`.
    ///
    /// Returns the server's `InitializeResult`.
    pub async fn handshake(&mut self) -> Result<Value, SessionError> {
        let params = initialize_params(CLIENT_NAME, env!("CARGO_PKG_VERSION"));
        let response = self.request(methods::INITIALIZE, Some(params)).await?;
        let result = response
            .into_result()
            .map_err(|e| SessionError::Connection(format!("initialize rejected: {e}")))?;

        self.transport
            .send(&JsonRpcNotification::new(methods::INITIALIZED))
            .await?;
        Ok(result)
    }

    /// Sends one request and waits for the response with the same id.
    ///
    /// While waiting, notifications are logged and skipped, requests from the
    /// backend are answered so it never stalls, and responses to other ids
    /// are dropped.
    pub async fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, SessionError> {
        let id = self.ids.next();
        self.transport
            .send(&JsonRpcRequest::new(id, method, params))
            .await?;
        debug!(id, method, "backend request sent");

        loop {
            let line = self.transport.next_line().await?;
            match decode_line(&line) {
                Ok(JsonRpcMessage::Response(response)) if response.answers(id) => {
                    return Ok(response)
                }
                Ok(JsonRpcMessage::Response(response)) => {
                    debug!("skipping backend response for unknown id {}", response.id);
                }
                Ok(JsonRpcMessage::Notification(notification)) => {
                    debug!("backend notification {}", notification.method);
                }
                Ok(JsonRpcMessage::Request(request)) => {
                    self.answer(request).await?;
                }
                Err(e) => warn!("ignoring unreadable backend output: {e}"),
            }
        }
    }

    /// Replies to a request initiated by the backend.
    async fn answer(&mut self, request: JsonRpcRequest) -> Result<(), SessionError> {
        let reply = if request.method == methods::PING {
            JsonRpcResponse::success(request.id, json!({}))
        } else {
            debug!("backend asked for unsupported method {}", request.method);
            JsonRpcResponse::failure(
                request.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )
        };
        self.transport.send(&reply).await
    }

    /// Releases the client and closes the transport.
    pub async fn close(self) {
        self.transport.close().await;
    }
}
