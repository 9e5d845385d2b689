//! Typed MemoryMesh operations on top of [`BridgeClient`].
//!
//! Graph operations go out as raw `tools/call` requests, built by
//! [`ToolInvocation`] so the tool names and argument shapes are the same ones
//! the bridge uses for its `memory/*` operations.

use std::sync::Arc;

use mesh_core::{CodecError, Method, ToolInvocation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::correlator::BridgeClient;
use crate::error::ClientError;

/// Result of `bridge/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub mcp_connected: bool,
    pub active_connections: usize,
    /// Seconds since the bridge started.
    pub uptime: f64,
}

/// Result of `ping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub pong: bool,
    /// Bridge wall clock, milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// MemoryMesh graph API over a shared [`BridgeClient`].
#[derive(Clone)]
pub struct MemoryApi {
    client: Arc<BridgeClient>,
}

impl MemoryApi {
    pub fn new(client: Arc<BridgeClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<BridgeClient> {
        &self.client
    }

    /// Sends one `tools/call` request.
    pub async fn invoke(&self, invocation: ToolInvocation) -> Result<Value, ClientError> {
        self.client
            .request(
                Method::ToolsCall.as_str(),
                json!({ "name": invocation.name, "arguments": invocation.arguments }),
            )
            .await
    }

    pub async fn add_node(&self, node_type: &str, data: Value) -> Result<Value, ClientError> {
        self.invoke(ToolInvocation::add_node(node_type, data)).await
    }

    pub async fn update_node(
        &self,
        node_type: &str,
        name: &str,
        data: Value,
    ) -> Result<Value, ClientError> {
        self.invoke(ToolInvocation::update_node(node_type, name, data))
            .await
    }

    pub async fn delete_node(&self, node_type: &str, name: &str) -> Result<Value, ClientError> {
        self.invoke(ToolInvocation::delete_node(node_type, name)).await
    }

    pub async fn search_memory(&self, query: &str) -> Result<Value, ClientError> {
        self.invoke(ToolInvocation::search_memory(query)).await
    }

    pub async fn get_memory_stats(&self) -> Result<Value, ClientError> {
        self.invoke(ToolInvocation::stats()).await
    }

    pub async fn create_relation(
        &self,
        from: &str,
        to: &str,
        relation_type: &str,
    ) -> Result<Value, ClientError> {
        self.invoke(ToolInvocation::create_relation(from, to, relation_type))
            .await
    }

    pub async fn get_all_nodes(&self) -> Result<Value, ClientError> {
        self.invoke(ToolInvocation::all_nodes()).await
    }

    pub async fn get_nodes_by_type(&self, node_type: &str) -> Result<Value, ClientError> {
        self.invoke(ToolInvocation::nodes_by_type(node_type)).await
    }

    /// Bridge health: backend connection, client count, uptime.
    pub async fn status(&self) -> Result<BridgeStatus, ClientError> {
        let value = self
            .client
            .request(Method::Status.as_str(), Value::Null)
            .await?;
        Ok(serde_json::from_value(value).map_err(CodecError::from)?)
    }

    /// Round trip to the bridge itself; answered even when the backend is down.
    pub async fn ping(&self) -> Result<Pong, ClientError> {
        let value = self
            .client
            .request(Method::Ping.as_str(), Value::Null)
            .await?;
        Ok(serde_json::from_value(value).map_err(CodecError::from)?)
    }
}
