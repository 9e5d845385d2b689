//! mesh-client — send one request to a MemoryMesh bridge and print the reply.
//!
//! # Usage
//!
//! ```text
//! mesh-client [--url <URL>] [--timeout <SECS>] <METHOD> [PARAMS]
//!
//! mesh-client bridge/status
//! mesh-client memory/search '{"query":"dragon"}'
//! mesh-client tools/call '{"name":"get_memory_stats","arguments":{}}'
//! ```
//!
//! The result is printed to stdout as pretty JSON; logs go to stderr.  An
//! error reply, a timeout, or a connection failure exits non-zero.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mesh_client::BridgeClient;
use mesh_core::Method;
use serde_json::Value;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_URL: &str = "ws://localhost:3000";

/// One-shot MemoryMesh bridge client.
#[derive(Debug, Parser)]
#[command(
    name = "mesh-client",
    about = "Send one request to a MemoryMesh bridge",
    version
)]
struct Cli {
    /// Bridge WebSocket URL.
    #[arg(long, env = "MEMORYMESH_URL", default_value = DEFAULT_URL)]
    url: String,

    /// Seconds to wait for the reply.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Operation name, e.g. `memory/search` or `bridge/status`.
    method: String,

    /// Operation params as JSON.
    params: Option<String>,
}

/// Parses the optional params argument; absent params are JSON `null`.
fn parse_params(raw: Option<&str>) -> anyhow::Result<Value> {
    match raw {
        Some(text) => serde_json::from_str(text)
            .with_context(|| format!("params are not valid JSON: {text}")),
        None => Ok(Value::Null),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let params = parse_params(cli.params.as_deref())?;
    if cli.method.parse::<Method>().is_err() {
        warn!("`{}` is not a known bridge operation; sending anyway", cli.method);
    }

    let client = BridgeClient::new(cli.url.clone()).with_timeout(Duration::from_secs(cli.timeout));
    client
        .connect()
        .await
        .with_context(|| format!("could not reach the bridge at {}", cli.url))?;

    let outcome = client.request(&cli.method, params).await;
    client.disconnect();

    let result = outcome.with_context(|| format!("{} failed", cli.method))?;
    debug!("{} succeeded", cli.method);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
