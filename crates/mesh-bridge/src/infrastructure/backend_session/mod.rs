//! Backend Session: the MemoryMesh child process and its MCP connection.
//!
//! # Lifecycle
//!
//! ```text
//!            start()                         process exits / stop()
//! Stopped ─────────────► Handshaking ──ok──► Connected ─────────────────────► Stopped
//!                             │
//!                             └──error / timeout──► child killed ──► Stopped
//! ```
//!
//! `connected` is a `tokio::sync::watch` value and the single source of
//! truth for "may a request be serviced".  It becomes `true` only after the
//! handshake completes and `false` on process exit, wait error, or `stop()`.
//!
//! # Ownership
//!
//! - The [`McpClient`] (and through it the stdio transport) sits behind an
//!   async mutex held for one full request/response exchange.
//! - The [`Child`] is owned by an exit-watcher task.  `stop()` reaches it
//!   through a oneshot channel carrying how long the process may take to
//!   exit after SIGTERM before it is killed.
//! - stderr is drained by its own task until EOF and logged under the
//!   `backend_stderr` target; it never reaches clients.

mod transport;

pub use transport::{McpClient, StdioTransport, CLIENT_NAME};

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mesh_core::protocol::jsonrpc::{methods, tool_call_params};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::application::backend::{SessionError, ToolBackend};
use crate::domain::config::{BackendCommand, BridgeConfig};

/// Handle on a running child: the stop channel and the watcher task.
struct ProcessHandle {
    stop_tx: oneshot::Sender<Duration>,
    watcher: JoinHandle<()>,
}

/// One backend process and its MCP session.
pub struct BackendSession {
    command: BackendCommand,
    handshake_timeout: Duration,
    shutdown_grace: Duration,
    connected: Arc<watch::Sender<bool>>,
    client: Mutex<Option<McpClient>>,
    process: Mutex<Option<ProcessHandle>>,
}

impl BackendSession {
    pub fn new(command: BackendCommand) -> Self {
        let defaults = BridgeConfig::default();
        let (connected, _) = watch::channel(false);
        Self {
            command,
            handshake_timeout: defaults.handshake_timeout,
            shutdown_grace: defaults.shutdown_grace,
            connected: Arc::new(connected),
            client: Mutex::new(None),
            process: Mutex::new(None),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.backend.clone())
            .with_handshake_timeout(config.handshake_timeout)
            .with_shutdown_grace(config.shutdown_grace)
    }

    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    /// Observes connected/disconnected transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Spawns the backend and performs the MCP handshake.
    ///
    /// Returns the server's `InitializeResult` (`serverInfo`,
    /// `protocolVersion`, `capabilities`).
    ///
    /// # Errors
    ///
    /// [`SessionError::Connection`] if a backend is already running, the
    /// process cannot be spawned, or the handshake fails or times out.  The
    /// child is killed and reaped before the error is returned.
    pub async fn start(&self) -> Result<Value, SessionError> {
        let mut process = self.process.lock().await;
        if process.as_ref().is_some_and(|p| !p.watcher.is_finished()) {
            return Err(SessionError::Connection(
                "backend already running".to_string(),
            ));
        }

        let line = self.command.display_line();
        info!("starting backend: {line}");

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.command.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &self.command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SessionError::Connection(format!("failed to spawn `{line}`: {e}")))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            reap(&mut child).await;
            return Err(SessionError::Connection(
                "backend stdio was not captured".to_string(),
            ));
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let mut client = McpClient::new(StdioTransport::new(stdin, stdout));
        let init = match timeout(self.handshake_timeout, client.handshake()).await {
            Ok(Ok(init)) => init,
            Ok(Err(e)) => {
                warn!("backend handshake failed: {e}");
                reap(&mut child).await;
                return Err(e);
            }
            Err(_) => {
                warn!("backend handshake timed out");
                reap(&mut child).await;
                return Err(SessionError::Connection(format!(
                    "handshake timed out after {:?}",
                    self.handshake_timeout
                )));
            }
        };

        *self.client.lock().await = Some(client);
        self.connected.send_replace(true);

        let (stop_tx, stop_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch_process(child, stop_rx, Arc::clone(&self.connected)));
        *process = Some(ProcessHandle { stop_tx, watcher });

        let server_info = init.get("serverInfo").cloned().unwrap_or_default();
        info!("backend connected: {server_info}");
        Ok(init)
    }

    /// Shuts the backend down.  Safe to call any number of times.
    ///
    /// Order: mark disconnected, release the MCP client and close stdin,
    /// send SIGTERM, give the process `shutdown_grace` to exit, then kill it.
    /// If an in-flight call still holds the transport after `shutdown_grace`,
    /// the process is killed straight away, which fails that call.
    pub async fn stop(&self) {
        let mut process = self.process.lock().await;
        let was_connected = mark_disconnected(&self.connected);
        if was_connected {
            info!("stopping backend");
        }

        let grace = match timeout(self.shutdown_grace, self.client.lock()).await {
            Ok(mut client) => {
                if let Some(client) = client.take() {
                    client.close().await;
                    debug!("backend stdin closed");
                }
                self.shutdown_grace
            }
            Err(_) => {
                warn!("backend call still in flight after {:?}; killing", self.shutdown_grace);
                Duration::ZERO
            }
        };

        if let Some(handle) = process.take() {
            // The watcher has already returned if the process exited on its own.
            let _ = handle.stop_tx.send(grace);
            if let Err(e) = handle.watcher.await {
                error!("backend watcher task failed: {e}");
            }
        }
    }

    /// One serialized JSON-RPC exchange, gated on `connected`.
    async fn exchange(&self, method: &str, params: Option<Value>) -> Result<Value, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let mut guard = self.client.lock().await;
        // Re-check: the session may have gone down while we waited for the lock.
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let client = guard.as_mut().ok_or(SessionError::NotConnected)?;
        // Past the handshake, a broken pipe is a failed call, not a failed start.
        let response = client
            .request(method, params)
            .await
            .map_err(|e| match e {
                SessionError::Connection(message) => SessionError::Backend(message),
                other => other,
            })?;
        response
            .into_result()
            .map_err(|e| SessionError::Backend(e.message))
    }
}

#[async_trait]
impl ToolBackend for BackendSession {
    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, SessionError> {
        self.exchange(methods::TOOLS_CALL, Some(tool_call_params(name, arguments)))
            .await
    }

    async fn list_tools(&self) -> Result<Value, SessionError> {
        self.exchange(methods::TOOLS_LIST, None).await
    }

    async fn list_resources(&self) -> Result<Value, SessionError> {
        self.exchange(methods::RESOURCES_LIST, None).await
    }

    async fn read_resource(&self, uri: &str) -> Result<Value, SessionError> {
        self.exchange(methods::RESOURCES_READ, Some(json!({ "uri": uri })))
            .await
    }
}

// ── Background tasks ──────────────────────────────────────────────────────────

/// Owns the child until it exits or a stop is requested.
///
/// A dropped `stop_rx` sender (the session itself was dropped) counts as a
/// stop request with no grace period.
async fn watch_process(
    mut child: Child,
    stop_rx: oneshot::Receiver<Duration>,
    connected: Arc<watch::Sender<bool>>,
) {
    let stop = tokio::select! {
        status = child.wait() => {
            mark_disconnected(&connected);
            match status {
                Ok(status) => warn!("backend process exited: {status}"),
                Err(e) => error!("waiting on backend process failed: {e}"),
            }
            None
        }
        grace = stop_rx => Some(grace.unwrap_or(Duration::ZERO)),
    };

    if let Some(grace) = stop {
        terminate(&child);
        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => info!("backend exited: {status}"),
            Ok(Err(e)) => warn!("waiting on backend process failed: {e}"),
            Err(_) => {
                if !grace.is_zero() {
                    warn!("backend did not exit within {grace:?}; killing");
                }
                reap(&mut child).await;
            }
        }
    }
}

/// Sets connected = false; `true` if it was connected.  Watchers are only
/// notified on an actual change.
fn mark_disconnected(connected: &watch::Sender<bool>) -> bool {
    connected.send_if_modified(|state| std::mem::replace(state, false))
}

/// Asks the child to exit with SIGTERM.
#[cfg(unix)]
fn terminate(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: `pid` is our own child and has not been reaped (`id()` is
    // `None` after a successful wait), so it cannot name another process.
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        debug!(
            "SIGTERM to backend failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

/// Kills the child and waits for it, logging rather than failing.
async fn reap(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("failed to kill backend process: {e}");
    }
}

/// Logs stderr line by line until EOF.  Bytes that are not UTF-8 are
/// replaced, never treated as the end of the stream.
async fn forward_stderr(stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                if !line.is_empty() {
                    warn!(target: "backend_stderr", "{line}");
                }
            }
            Err(e) => {
                debug!("reading backend stderr failed: {e}");
                break;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
