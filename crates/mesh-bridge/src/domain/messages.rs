//! Payloads produced by the bridge itself.
//!
//! Most results the bridge sends are the backend's tool output, passed through
//! untouched.  The few shapes below are the exception: the bridge builds them
//! without involving the backend.
//!
//! ```json
//! {"type":"welcome","message":"MemoryMesh bridge connected","mcpConnected":true}
//! {"mcpConnected":true,"activeConnections":2,"uptime":12.5}
//! {"pong":true,"timestamp":1718000000000}
//! {"connected":false}
//! ```
//!
//! Field names are camelCase on the wire because the note-taking plugin that
//! consumes them is written against that spelling.

use serde::{Deserialize, Serialize};

/// Text carried by every welcome message.
pub const WELCOME_TEXT: &str = "MemoryMesh bridge connected";

/// The `result` of the welcome response sent (with id 0) on every new
/// connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    /// Always `"welcome"`; lets clients recognise the message without
    /// relying on the reserved id alone.
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub mcp_connected: bool,
}

impl Welcome {
    pub fn new(mcp_connected: bool) -> Self {
        Self {
            kind: "welcome".to_string(),
            message: WELCOME_TEXT.to_string(),
            mcp_connected,
        }
    }
}

/// The `result` of `bridge/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub mcp_connected: bool,
    pub active_connections: usize,
    /// Seconds since the bridge started serving.
    pub uptime: f64,
}

/// The `result` of `ping`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingReply {
    pub pong: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl PingReply {
    pub fn at(timestamp: u64) -> Self {
        Self {
            pong: true,
            timestamp,
        }
    }
}

/// The `params` of an `mcp/status_changed` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub connected: bool,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_welcome_serializes_with_type_field() {
        // Arrange
        let welcome = Welcome::new(true);

        // Act
        let json = serde_json::to_value(&welcome).unwrap();

        // Assert
        assert_eq!(
            json,
            json!({"type": "welcome", "message": WELCOME_TEXT, "mcpConnected": true})
        );
    }

    #[test]
    fn test_status_snapshot_uses_camel_case() {
        let status = StatusSnapshot {
            mcp_connected: false,
            active_connections: 3,
            uptime: 1.5,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            json!({"mcpConnected": false, "activeConnections": 3, "uptime": 1.5})
        );
    }

    #[test]
    fn test_ping_reply_always_pongs() {
        let json = serde_json::to_value(PingReply::at(42)).unwrap();
        assert_eq!(json, json!({"pong": true, "timestamp": 42}));
    }

    #[test]
    fn test_status_changed_shape() {
        let json = serde_json::to_value(StatusChanged { connected: false }).unwrap();
        assert_eq!(json, json!({"connected": false}));
    }
}
