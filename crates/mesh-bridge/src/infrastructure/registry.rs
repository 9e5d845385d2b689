//! Connection Registry: the set of open client connections.
//!
//! Each connection is represented by a [`ConnectionId`] and the sending half
//! of a bounded channel.  The connection's writer task owns the WebSocket
//! sink and drains the channel, so the registry never awaits a socket.
//!
//! ```text
//! broadcast(frame) ──try_send──► [mpsc] ──► writer task ──► WebSocket
//!                  ──try_send──► [mpsc] ──► writer task ──► WebSocket
//! ```
//!
//! A connection whose channel is full or closed is skipped, not removed;
//! its own reader task unregisters it when the socket goes away.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use mesh_core::{encode_frame, Notification};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::dispatch::ConnectionCounter;

/// Capacity of each connection's outbound queue.
pub const OUTBOUND_QUEUE: usize = 256;

/// Identifies one client connection for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a writer task is asked to put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A serialized text frame.
    Frame(String),
    /// Send a Close frame and stop.
    Close,
}

/// All open connections, keyed by id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<Outbound>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection.
    ///
    /// Returns the connection's own sender (for replies, which wait for
    /// queue space instead of being dropped) and the receiver its writer task
    /// drains.
    pub async fn register(
        &self,
        id: ConnectionId,
    ) -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let mut map = self.connections.write().await;
        map.insert(id, tx.clone());
        debug!("registered connection {id} ({} open)", map.len());
        (tx, rx)
    }

    /// Removes a connection.  Returns `false` if it was not registered,
    /// which is not an error.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut map = self.connections.write().await;
        let removed = map.remove(&id).is_some();
        if removed {
            debug!("unregistered connection {id} ({} open)", map.len());
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Serializes `payload` once and queues it on every connection.
    ///
    /// Returns the number of connections the frame was queued for.
    pub async fn broadcast<T: Serialize>(&self, payload: &T) -> usize {
        let frame = match encode_frame(payload) {
            Ok(frame) => frame,
            Err(e) => {
                error!("broadcast payload could not be serialized: {e}");
                return 0;
            }
        };

        let map = self.connections.read().await;
        let mut delivered = 0;
        for (id, tx) in map.iter() {
            match tx.try_send(Outbound::Frame(frame.clone())) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("connection {id}: outbound queue full, broadcast skipped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("connection {id}: already closing, broadcast skipped");
                }
            }
        }
        delivered
    }

    /// Broadcasts a `{method, params}` notification.
    pub async fn notify(&self, method: &str, params: Value) -> usize {
        self.broadcast(&Notification::new(method, params)).await
    }

    /// Asks every writer task to send a Close frame, then forgets all
    /// connections.  Returns how many close requests were queued.
    pub async fn close_all(&self) -> usize {
        let mut map = self.connections.write().await;
        let closed = map
            .values()
            .filter(|tx| tx.try_send(Outbound::Close).is_ok())
            .count();
        map.clear();
        closed
    }
}

#[async_trait]
impl ConnectionCounter for ConnectionRegistry {
    async fn active_connections(&self) -> usize {
        self.len().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
