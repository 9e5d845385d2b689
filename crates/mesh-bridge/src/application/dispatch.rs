//! The dispatch table: one handler per operation in the bridge vocabulary.
//!
//! [`DispatchTable::invoke`] is an exhaustive `match` over [`Method`], so
//! adding an operation to the vocabulary without handling it here is a
//! compile error.
//!
//! Handlers return JSON values and never touch the network.  The only
//! handler that looks at connection state (`bridge/status`) does so through
//! the read-only [`ConnectionCounter`] seam.
//!
//! # Parameter shapes
//!
//! | Method                     | Params                              |
//! |----------------------------|-------------------------------------|
//! | `tools/call`               | `{name, arguments?}`                |
//! | `resources/read`           | `{uri}`                             |
//! | `memory/add_node`          | `{nodeType, data}`                  |
//! | `memory/update_node`       | `{nodeType, name, data}`            |
//! | `memory/delete_node`       | `{nodeType, name}`                  |
//! | `memory/search`            | `{query}`                           |
//! | `memory/create_relation`   | `{from, to, relationType}`          |
//! | `memory/get_nodes_by_type` | `{nodeType}`                        |
//!
//! Every other operation ignores its params.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use mesh_core::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::application::backend::{MemoryGraphExt, SessionError, ToolBackend};
use crate::domain::messages::{PingReply, StatusSnapshot};

/// Read-only view of how many clients are connected.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionCounter: Send + Sync {
    async fn active_connections(&self) -> usize;
}

/// A handler failure; the router reports it as `-32000 "Internal error"`.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid params for {method}: {reason}")]
    InvalidParams { method: Method, reason: String },

    #[error(transparent)]
    Backend(#[from] SessionError),
}

// ── Parameter shapes ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ReadResourceParams {
    uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddNodeParams {
    node_type: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateNodeParams {
    node_type: String,
    name: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteNodeParams {
    node_type: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationParams {
    from: String,
    to: String,
    relation_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeTypeParams {
    node_type: String,
}

fn parse<T: DeserializeOwned>(method: Method, params: Value) -> Result<T, HandlerError> {
    serde_json::from_value(params).map_err(|e| HandlerError::InvalidParams {
        method,
        reason: e.to_string(),
    })
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Dispatch table ────────────────────────────────────────────────────────────

/// Maps each [`Method`] to its handler.
///
/// Built once per bridge; cloning shares the same backend, counter, and
/// start time.
#[derive(Clone)]
pub struct DispatchTable {
    backend: Arc<dyn ToolBackend>,
    connections: Arc<dyn ConnectionCounter>,
    started_at: Instant,
}

impl DispatchTable {
    pub fn new(backend: Arc<dyn ToolBackend>, connections: Arc<dyn ConnectionCounter>) -> Self {
        Self {
            backend,
            connections,
            started_at: Instant::now(),
        }
    }

    /// Whether the backend can currently service requests.
    pub fn backend_connected(&self) -> bool {
        self.backend.is_connected()
    }

    /// Runs the handler for `method`.
    ///
    /// The caller is responsible for the connected gate; this function does
    /// not consult it (so `ping` and `bridge/status` can run regardless).
    ///
    /// # Errors
    ///
    /// [`HandlerError::InvalidParams`] if `params` does not have the shape
    /// the operation needs; [`HandlerError::Backend`] if the backend call
    /// fails.
    pub async fn invoke(&self, method: Method, params: Value) -> Result<Value, HandlerError> {
        debug!("dispatching {method}");
        let backend = self.backend.as_ref();

        let result = match method {
            Method::ToolsCall => {
                let p: ToolCallParams = parse(method, params)?;
                backend.call_tool(&p.name, p.arguments).await?
            }
            Method::ToolsList => backend.list_tools().await?,
            Method::ResourcesList => backend.list_resources().await?,
            Method::ResourcesRead => {
                let p: ReadResourceParams = parse(method, params)?;
                backend.read_resource(&p.uri).await?
            }
            Method::AddNode => {
                let p: AddNodeParams = parse(method, params)?;
                backend.add_node(&p.node_type, p.data).await?
            }
            Method::UpdateNode => {
                let p: UpdateNodeParams = parse(method, params)?;
                backend.update_node(&p.node_type, &p.name, p.data).await?
            }
            Method::DeleteNode => {
                let p: DeleteNodeParams = parse(method, params)?;
                backend.delete_node(&p.node_type, &p.name).await?
            }
            Method::Search => {
                let p: SearchParams = parse(method, params)?;
                backend.search_memory(&p.query).await?
            }
            Method::Stats => backend.get_stats().await?,
            Method::CreateRelation => {
                let p: RelationParams = parse(method, params)?;
                backend
                    .create_relation(&p.from, &p.to, &p.relation_type)
                    .await?
            }
            Method::GetAllNodes => backend.list_all().await?,
            Method::GetNodesByType => {
                let p: NodeTypeParams = parse(method, params)?;
                backend.list_by_type(&p.node_type).await?
            }
            Method::Status => to_value(self.status().await),
            Method::Ping => to_value(PingReply::at(unix_millis())),
        };
        Ok(result)
    }

    /// Builds the `bridge/status` snapshot.
    pub async fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            mcp_connected: self.backend.is_connected(),
            active_connections: self.connections.active_connections().await,
            uptime: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

/// Serializes one of the bridge's own payload structs.
///
/// These structs hold only strings, numbers and booleans, so conversion
/// cannot fail; `Null` is returned rather than panicking if it ever did.
fn to_value<T: serde::Serialize>(payload: T) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
