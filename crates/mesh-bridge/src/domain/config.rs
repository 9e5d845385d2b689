//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is assembled by the binary from the optional TOML settings file and the
//! command line, or taken from [`BridgeConfig::default`] in tests.
//!
//! The domain never reads environment variables or files itself; the
//! infrastructure layer fills the struct in.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default WebSocket port, matching the note-taking plugin's default URL.
pub const DEFAULT_PORT: u16 = 3000;

/// Default backend executable (MemoryMesh ships as a Node.js script).
pub const DEFAULT_BACKEND_PROGRAM: &str = "node";

/// How the backend process is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    /// Executable to spawn, resolved through `PATH` when not absolute.
    pub program: String,

    /// Arguments passed verbatim, e.g. the path to MemoryMesh's `index.js`.
    pub args: Vec<String>,

    /// Extra environment variables set on top of the bridge's own environment.
    pub env: Vec<(String, String)>,

    /// Working directory; `None` inherits the bridge's.
    pub cwd: Option<PathBuf>,
}

impl BackendCommand {
    /// Creates a command with no arguments, extra variables, or working directory.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Replaces the argument list.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Renders the command line for log output.
    pub fn display_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

impl Default for BackendCommand {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_PROGRAM)
    }
}

/// All runtime configuration for the bridge.
///
/// Build this once at startup and hand it to
/// [`run_server`](crate::infrastructure::run_server).
///
/// # Example
///
/// ```rust
/// use mesh_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 3000);
/// assert_eq!(cfg.backend.program, "node");
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The address and port the WebSocket server binds to.
    ///
    /// Defaults to loopback: the bridge has no client authentication, so
    /// exposing it on a LAN interface is an explicit operator choice.
    pub ws_bind_addr: SocketAddr,

    /// The MemoryMesh process to launch.
    pub backend: BackendCommand,

    /// Upper bound on the MCP `initialize` exchange.
    pub handshake_timeout: Duration,

    /// How long the backend gets to exit on its own after stdin is closed
    /// before it is killed.
    pub shutdown_grace: Duration,
}

impl Default for BridgeConfig {
    /// | Field             | Default           |
    /// |-------------------|-------------------|
    /// | ws_bind_addr      | `127.0.0.1:3000`  |
    /// | backend           | `node`, no args   |
    /// | handshake_timeout | 10 seconds        |
    /// | shutdown_grace    | 3 seconds         |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            backend: BackendCommand::default(),
            handshake_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(3),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
