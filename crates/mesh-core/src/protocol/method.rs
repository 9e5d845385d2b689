//! The closed vocabulary of operations a client may ask the bridge to perform.
//!
//! Every wire name maps to exactly one [`Method`] variant.  The bridge routes
//! requests with an exhaustive `match` over this enum, so adding an operation
//! means adding a variant here and the compiler then points at every place
//! that must handle it.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Notification method names the bridge emits.
pub mod notifications {
    /// Backend liveness changed; params `{"connected": bool}`.
    pub const STATUS_CHANGED: &str = "mcp/status_changed";
    /// The bridge is shutting down and will close the connection.
    pub const SHUTDOWN: &str = "bridge/shutdown";
}

/// A client-visible operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `tools/call` – invoke an arbitrary backend tool.
    ToolsCall,
    /// `tools/list` – list the backend's tools.
    ToolsList,
    /// `resources/list` – list the backend's resources.
    ResourcesList,
    /// `resources/read` – read one resource by URI.
    ResourcesRead,
    /// `memory/add_node`
    AddNode,
    /// `memory/update_node`
    UpdateNode,
    /// `memory/delete_node`
    DeleteNode,
    /// `memory/search`
    Search,
    /// `memory/stats`
    Stats,
    /// `memory/create_relation`
    CreateRelation,
    /// `memory/get_all_nodes`
    GetAllNodes,
    /// `memory/get_nodes_by_type`
    GetNodesByType,
    /// `bridge/status` – connection flag, connection count, uptime.
    Status,
    /// `ping` – liveness probe of the bridge itself.
    Ping,
}

impl Method {
    /// Every operation, in wire-documentation order.
    pub const ALL: [Method; 14] = [
        Method::ToolsCall,
        Method::ToolsList,
        Method::ResourcesList,
        Method::ResourcesRead,
        Method::AddNode,
        Method::UpdateNode,
        Method::DeleteNode,
        Method::Search,
        Method::Stats,
        Method::CreateRelation,
        Method::GetAllNodes,
        Method::GetNodesByType,
        Method::Status,
        Method::Ping,
    ];

    /// Returns the wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::ToolsCall => "tools/call",
            Method::ToolsList => "tools/list",
            Method::ResourcesList => "resources/list",
            Method::ResourcesRead => "resources/read",
            Method::AddNode => "memory/add_node",
            Method::UpdateNode => "memory/update_node",
            Method::DeleteNode => "memory/delete_node",
            Method::Search => "memory/search",
            Method::Stats => "memory/stats",
            Method::CreateRelation => "memory/create_relation",
            Method::GetAllNodes => "memory/get_all_nodes",
            Method::GetNodesByType => "memory/get_nodes_by_type",
            Method::Status => "bridge/status",
            Method::Ping => "ping",
        }
    }

    /// Returns `true` for operations that may run while the backend is down.
    pub const fn is_exempt(self) -> bool {
        matches!(self, Method::Status | Method::Ping)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire name is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}
