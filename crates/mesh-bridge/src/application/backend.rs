//! The seam between request handling and the backend process.
//!
//! The dispatch table only ever talks to the backend through [`ToolBackend`].
//! Production code plugs in
//! [`BackendSession`](crate::infrastructure::backend_session::BackendSession);
//! tests plug in a `mockall` mock or a recording double.
//!
//! [`MemoryGraphExt`] layers MemoryMesh's graph operations on top of
//! `call_tool`.  It is blanket-implemented for every `ToolBackend`, so the
//! session and every test double get it for free.

use async_trait::async_trait;
use mesh_core::ToolInvocation;
use serde_json::Value;
use thiserror::Error;

/// Errors raised by a backend session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The process could not be started, lost its pipes, or failed the MCP
    /// handshake.
    #[error("backend connection failed: {0}")]
    Connection(String),

    /// A call was attempted while no backend is connected.
    #[error("backend not connected")]
    NotConnected,

    /// The backend answered with a JSON-RPC error.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Operations the bridge needs from its backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Returns `true` while requests may be serviced.
    fn is_connected(&self) -> bool;

    /// Invokes a named tool and returns its `result` verbatim.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, SessionError>;

    async fn list_tools(&self) -> Result<Value, SessionError>;

    async fn list_resources(&self) -> Result<Value, SessionError>;

    async fn read_resource(&self, uri: &str) -> Result<Value, SessionError>;
}

/// MemoryMesh graph operations, expressed as tool calls.
#[async_trait]
pub trait MemoryGraphExt: ToolBackend {
    async fn invoke_tool(&self, call: ToolInvocation) -> Result<Value, SessionError> {
        self.call_tool(&call.name, call.arguments).await
    }

    async fn add_node(&self, node_type: &str, data: Value) -> Result<Value, SessionError> {
        self.invoke_tool(ToolInvocation::add_node(node_type, data))
            .await
    }

    async fn update_node(
        &self,
        node_type: &str,
        name: &str,
        data: Value,
    ) -> Result<Value, SessionError> {
        self.invoke_tool(ToolInvocation::update_node(node_type, name, data))
            .await
    }

    async fn delete_node(&self, node_type: &str, name: &str) -> Result<Value, SessionError> {
        self.invoke_tool(ToolInvocation::delete_node(node_type, name))
            .await
    }

    async fn search_memory(&self, query: &str) -> Result<Value, SessionError> {
        self.invoke_tool(ToolInvocation::search_memory(query)).await
    }

    async fn get_stats(&self) -> Result<Value, SessionError> {
        self.invoke_tool(ToolInvocation::stats()).await
    }

    async fn create_relation(
        &self,
        from: &str,
        to: &str,
        relation_type: &str,
    ) -> Result<Value, SessionError> {
        self.invoke_tool(ToolInvocation::create_relation(from, to, relation_type))
            .await
    }

    async fn list_by_type(&self, node_type: &str) -> Result<Value, SessionError> {
        self.invoke_tool(ToolInvocation::nodes_by_type(node_type))
            .await
    }

    async fn list_all(&self) -> Result<Value, SessionError> {
        self.invoke_tool(ToolInvocation::all_nodes()).await
    }
}

impl<T: ToolBackend + ?Sized> MemoryGraphExt for T {}

// ── Tests ─────────────────────────────────────────────────────────────────────
