//! Persistent settings.

pub mod config;

pub use config::{load_settings, parse_settings, BridgeSettings, ConfigError};
