//! mesh-bridge library crate.
//!
//! This crate exposes a single long-lived MemoryMesh process (a Model Context
//! Protocol server speaking JSON-RPC over its standard input/output) to any
//! number of WebSocket clients.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! WebSocket clients (JSON frames)
//!         ↕
//! [mesh-bridge]
//!   ├── domain/           Pure types: BridgeConfig, welcome/status/ping payloads
//!   ├── application/      Backend seam (ToolBackend), Dispatch Table, Router
//!   └── infrastructure/
//!         ├── backend_session/  MemoryMesh child process + MCP handshake
//!         ├── registry/         Connection Registry (unicast + broadcast)
//!         ├── ws_server/        WebSocket accept loop (tokio-tungstenite)
//!         └── storage/          TOML settings store
//!         ↕
//! MemoryMesh process (JSON-RPC 2.0 lines on stdio)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `mesh-core`; it reaches the
//!   backend and the registry only through the `ToolBackend` and
//!   `ConnectionCounter` traits.
//! - `infrastructure` implements those traits with `tokio` processes and
//!   `tokio-tungstenite` sockets.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: operation dispatch and per-frame routing.
pub mod application;

/// Infrastructure layer: backend process, sockets, registry, settings.
pub mod infrastructure;
