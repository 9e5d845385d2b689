//! MemoryMesh bridge — entry point.
//!
//! This binary launches one MemoryMesh process (an MCP server speaking
//! JSON-RPC over stdio) and exposes it to any number of WebSocket clients,
//! such as the note-taking plugin.
//!
//! # Why a bridge process?
//!
//! An MCP stdio server talks to exactly one parent over a pipe.  Editors and
//! browser-hosted plugins cannot spawn processes, but they can open a
//! WebSocket.  The bridge owns the pipe and multiplexes many sockets onto it.
//!
//! # Usage
//!
//! ```text
//! mesh-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>              TOML settings file
//!   --port <PORT>                WebSocket listener port [default: 3000]
//!   --bind <IP>                  WebSocket bind address [default: 127.0.0.1]
//!   --backend-command <PROGRAM>  Backend executable [default: node]
//!   --backend-args <A,B,...>     Backend arguments, comma separated
//!   --handshake-timeout <SECS>   MCP initialize timeout [default: 10]
//!   --shutdown-grace <SECS>      Time the backend gets to exit [default: 3]
//! ```
//!
//! # Environment variable overrides
//!
//! Command-line flags win over environment variables, which win over the
//! settings file.
//!
//! | Variable          | Flag                |
//! |-------------------|---------------------|
//! | `BRIDGE_CONFIG`   | `--config`          |
//! | `PORT`            | `--port`            |
//! | `BRIDGE_BIND`     | `--bind`            |
//! | `MEMORYMESH_PATH` | `--backend-command` |
//! | `MEMORYMESH_ARGS` | `--backend-args`    |
//! | `RUST_LOG`        | log filter (`info`) |

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mesh_bridge::domain::BridgeConfig;
use mesh_bridge::infrastructure::run_server;
use mesh_bridge::infrastructure::storage::{load_settings, BridgeSettings};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// MemoryMesh WebSocket bridge.
///
/// Every option is optional; anything not given falls back to the settings
/// file (if any) and then to built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "mesh-bridge",
    about = "WebSocket bridge for a MemoryMesh MCP server",
    version
)]
struct Cli {
    /// Path to a TOML settings file.
    #[arg(long, env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port for the WebSocket server.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// IP address to bind the WebSocket server to.
    ///
    /// The bridge does not authenticate clients; binding anything other than
    /// loopback exposes the memory graph to the network.
    #[arg(long, env = "BRIDGE_BIND")]
    bind: Option<String>,

    /// Executable that runs MemoryMesh.
    #[arg(long, env = "MEMORYMESH_PATH")]
    backend_command: Option<String>,

    /// Arguments for the backend executable, comma separated.
    #[arg(long, env = "MEMORYMESH_ARGS", value_delimiter = ',')]
    backend_args: Vec<String>,

    /// Seconds to wait for the MCP handshake.
    #[arg(long)]
    handshake_timeout: Option<u64>,

    /// Seconds the backend gets to exit after its stdin is closed.
    #[arg(long)]
    shutdown_grace: Option<u64>,
}

impl Cli {
    /// Merges the settings file (if any) with the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be loaded or the bind
    /// address is not an IP address.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let mut settings = match &self.config {
            Some(path) => load_settings(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => BridgeSettings::default(),
        };

        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(bind) = self.bind {
            settings.server.bind_address = bind;
        }
        if let Some(command) = self.backend_command {
            settings.backend.command = command;
        }
        if !self.backend_args.is_empty() {
            settings.backend.args = self.backend_args;
        }
        if let Some(secs) = self.handshake_timeout {
            settings.backend.handshake_timeout_secs = secs;
        }
        if let Some(secs) = self.shutdown_grace {
            settings.backend.shutdown_grace_secs = secs;
        }

        settings
            .into_bridge_config()
            .context("invalid bridge settings")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. Logging is initialised from `RUST_LOG` (default `info`) and panics are
///    routed through `tracing`.
/// 2. CLI arguments and the settings file become a [`BridgeConfig`].
/// 3. A signal task clears the shared `running` flag on Ctrl+C or SIGTERM.
/// 4. [`run_server`] starts the backend and serves until the flag clears.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    install_panic_hook();

    let config = Cli::parse().into_bridge_config()?;

    info!(
        "MemoryMesh bridge starting — ws={}, backend={}",
        config.ws_bind_addr,
        config.backend.display_line()
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        shutdown_signal().await;
        running_clone.store(false, Ordering::Relaxed);
    });

    if let Err(e) = run_server(config, running).await {
        error!("bridge failed: {e:#}");
        return Err(e);
    }

    info!("MemoryMesh bridge stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C — initiating graceful shutdown"),
        _ = terminate => info!("received SIGTERM — initiating graceful shutdown"),
    }
}

/// Logs panics through `tracing` before the default hook prints them.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!("panic: {panic_info}");
        default_hook(panic_info);
    }));
}

// ── Tests ─────────────────────────────────────────────────────────────────────
