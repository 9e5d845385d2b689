//! WebSocket server: accept loop, per-connection tasks, and shutdown.
//!
//! This module is responsible for:
//!
//! 1. Starting the backend session and binding the TCP listener.
//! 2. Upgrading each accepted connection to a WebSocket.
//! 3. Registering the connection and sending the welcome message.
//! 4. Handling every inbound frame in its own task, so a slow backend call
//!    never holds up the next frame on the same connection.
//! 5. Broadcasting backend status changes to every connection.
//! 6. Shutting down in order when the `running` flag is cleared.
//!
//! # Per-connection tasks
//!
//! ```text
//!                  ┌── frame task ──┐
//! reader loop ─────┼── frame task ──┼──► [mpsc] ──► writer task ──► WebSocket sink
//!                  └── frame task ──┘       ▲
//!                         registry.broadcast┘
//! ```
//!
//! The writer task is the only owner of the sink.  Replies and broadcasts
//! both travel through the connection's queue.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use mesh_core::protocol::codec::frame_text;
use mesh_core::protocol::notifications;
use mesh_core::{encode_frame, BridgeResponse};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::backend::ToolBackend;
use crate::application::dispatch::DispatchTable;
use crate::application::router::{handle_frame, parse_error, welcome};
use crate::domain::config::BridgeConfig;
use crate::domain::messages::StatusChanged;
use crate::infrastructure::backend_session::BackendSession;
use crate::infrastructure::registry::{ConnectionId, ConnectionRegistry, Outbound};

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Bridge server ─────────────────────────────────────────────────────────────

/// Serves WebSocket clients on top of one [`ToolBackend`].
pub struct BridgeServer {
    dispatch: DispatchTable,
    registry: Arc<ConnectionRegistry>,
}

impl BridgeServer {
    pub fn new(backend: Arc<dyn ToolBackend>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatch = DispatchTable::new(backend, Arc::clone(&registry) as _);
        Self { dispatch, registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Accepts connections until `running` is cleared.
    ///
    /// Each connection is handed to its own task; the loop itself never
    /// awaits anything but `accept`.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, running: Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // Short timeout so the flag is re-checked even with no traffic.
            match timeout(ACCEPT_POLL, listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    debug!("new connection from {peer_addr}");
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_connection(stream, peer_addr).await;
                    });
                }
                Ok(Err(e)) => {
                    // Transient (e.g. out of file descriptors); keep serving.
                    error!("accept error: {e}");
                }
                Err(_) => {}
            }
        }
    }

    /// Forwards backend connected/disconnected transitions to every client
    /// as `mcp/status_changed`.
    pub fn forward_backend_status(
        self: &Arc<Self>,
        mut status: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            while status.changed().await.is_ok() {
                let connected = *status.borrow_and_update();
                info!("backend {}", if connected { "connected" } else { "disconnected" });
                let params = serde_json::to_value(StatusChanged { connected }).unwrap_or_default();
                let delivered = server
                    .registry
                    .notify(notifications::STATUS_CHANGED, params)
                    .await;
                debug!("status change delivered to {delivered} connection(s)");
            }
        })
    }

    /// Tells every client the bridge is going away and closes their sockets.
    pub async fn shutdown(&self) {
        let notified = self
            .registry
            .notify(notifications::SHUTDOWN, json!({}))
            .await;
        let closed = self.registry.close_all().await;
        info!("shutdown notice sent to {notified} connection(s), {closed} closed");
    }

    // ── Per-connection handling ───────────────────────────────────────────────

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        match self.run_connection(stream, peer_addr).await {
            Ok(()) => debug!("connection {peer_addr} closed"),
            Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
        }
    }

    async fn run_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> anyhow::Result<()> {
        let ws_stream = accept_async(stream)
            .await
            .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
        let (mut sink, mut source) = ws_stream.split();

        let id = ConnectionId::new();
        let (tx, mut outbound) = self.registry.register(id).await;
        info!(
            "client {id} connected from {peer_addr} ({} open)",
            self.registry.len().await
        );

        // ── Writer task ───────────────────────────────────────────────────────
        tokio::spawn(async move {
            while let Some(item) = outbound.recv().await {
                match item {
                    Outbound::Frame(text) => {
                        if let Err(e) = sink.send(WsMessage::Text(text)).await {
                            debug!("client {id}: send failed: {e}");
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
            let _ = sink.close().await;
        });

        send(&tx, &welcome(self.dispatch.backend_connected())).await;

        // ── Reader loop ───────────────────────────────────────────────────────
        while let Some(frame) = source.next().await {
            let text = match frame {
                Ok(WsMessage::Text(text)) => text,
                Ok(WsMessage::Binary(bytes)) => match frame_text(&bytes) {
                    Ok(text) => text.to_string(),
                    Err(e) => {
                        send(&tx, &parse_error(e.to_string())).await;
                        continue;
                    }
                },
                Ok(WsMessage::Close(_)) => break,
                // Ping/pong are answered by tungstenite.
                Ok(_) => continue,
                Err(WsError::ConnectionClosed | WsError::Protocol(_)) => break,
                Err(e) => {
                    warn!("client {id}: WebSocket error: {e}");
                    break;
                }
            };

            let server = Arc::clone(self);
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = handle_frame(&server.dispatch, &text).await;
                send(&tx, &response).await;
            });
        }

        self.registry.unregister(id).await;
        info!(
            "client {id} disconnected ({} open)",
            self.registry.len().await
        );
        Ok(())
    }
}

/// Queues a response on one connection, waiting for space if needed.
async fn send(tx: &mpsc::Sender<Outbound>, response: &BridgeResponse) {
    match encode_frame(response) {
        Ok(frame) => {
            if tx.send(Outbound::Frame(frame)).await.is_err() {
                debug!("response {} dropped: connection closed", response.id);
            }
        }
        Err(e) => error!("response {} could not be serialized: {e}", response.id),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Runs the bridge until `running` is cleared.
///
/// # Startup
///
/// The backend is started first; a backend that cannot be started is fatal.
/// The listener is bound afterwards, and the backend is stopped again if
/// binding fails.
///
/// # Shutdown
///
/// Stop accepting, notify and close every client, then stop the backend.
/// Each step runs regardless of how the previous one went.
///
/// # Errors
///
/// Returns an error if the backend cannot be started or the listener cannot
/// be bound.
pub async fn run_server(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let session = Arc::new(BackendSession::from_config(&config));
    session
        .start()
        .await
        .with_context(|| format!("failed to start backend `{}`", config.backend.display_line()))?;

    let listener = match TcpListener::bind(config.ws_bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            session.stop().await;
            return Err(e).with_context(|| {
                format!("failed to bind WebSocket listener on {}", config.ws_bind_addr)
            });
        }
    };
    info!("MemoryMesh bridge listening on ws://{}", config.ws_bind_addr);

    let server = Arc::new(BridgeServer::new(Arc::clone(&session) as Arc<dyn ToolBackend>));
    let status_task = server.forward_backend_status(session.subscribe());

    Arc::clone(&server).serve(listener, running).await;

    status_task.abort();
    server.shutdown().await;
    session.stop().await;
    Ok(())
}
