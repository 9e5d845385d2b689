//! TOML settings file for the bridge.
//!
//! The file is optional; every field has a default, so an empty file (or no
//! file at all) yields a working configuration:
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1"
//! port = 3000
//!
//! [backend]
//! command = "node"
//! args = ["/opt/memorymesh/dist/index.js"]
//! handshake_timeout_secs = 10
//! shutdown_grace_secs = 3
//!
//! [backend.env]
//! MEMORY_FILE = "/var/lib/memorymesh/memory.json"
//! ```
//!
//! Fields annotated with `#[serde(default = "some_fn")]` take the value of
//! `some_fn()` when absent, which also keeps older files loadable when new
//! fields are added.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{
    BackendCommand, BridgeConfig, DEFAULT_BACKEND_PROGRAM, DEFAULT_PORT,
};

/// Error type for settings file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` is not an IP address.
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Top-level settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeSettings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub backend: BackendSettings,
}

/// Where the WebSocket server listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    /// IP address to bind.  `"0.0.0.0"` exposes the bridge on every interface.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// How to launch MemoryMesh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendSettings {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Extra environment variables for the backend process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_command() -> String {
    DEFAULT_BACKEND_PROGRAM.to_string()
}
fn default_handshake_timeout_secs() -> u64 {
    10
}
fn default_shutdown_grace_secs() -> u64 {
    3
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }
}

impl BridgeSettings {
    /// Converts the file representation into the runtime [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidAddress`] if `server.bind_address` is not an IP.
    pub fn into_bridge_config(self) -> Result<BridgeConfig, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.server.bind_address.clone()))?;

        let backend = BackendCommand {
            program: self.backend.command,
            args: self.backend.args,
            env: self.backend.env.into_iter().collect(),
            cwd: self.backend.cwd,
        };

        Ok(BridgeConfig {
            ws_bind_addr: SocketAddr::new(ip, self.server.port),
            backend,
            handshake_timeout: Duration::from_secs(self.backend.handshake_timeout_secs),
            shutdown_grace: Duration::from_secs(self.backend.shutdown_grace_secs),
        })
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses settings from TOML text.
///
/// # Errors
///
/// [`ConfigError::Parse`] if the text is not valid TOML for this schema.
pub fn parse_settings(text: &str) -> Result<BridgeSettings, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Loads settings from `path`.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`] if
/// its content is invalid.
pub fn load_settings(path: &Path) -> Result<BridgeSettings, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
