//! Backend session tests against a scripted MCP server.
//!
//! The "backend" is a small `sh` script that speaks just enough newline
//! delimited JSON-RPC to exercise the handshake, request correlation,
//! server-initiated pings, process exit and shutdown.

#![cfg(unix)]

use std::time::{Duration, Instant};

use mesh_bridge::application::{MemoryGraphExt, SessionError, ToolBackend};
use mesh_bridge::domain::BackendCommand;
use mesh_bridge::infrastructure::BackendSession;
use serde_json::json;
use tokio::time::timeout;

/// Answers the handshake, then serves requests until stdin closes.
///
/// `tools/call` first emits a notification and a server-initiated `ping`,
/// and only answers once the ping has been replied to.  A tool named `fail`
/// gets a JSON-RPC error.  `tools/list` is preceded by a stray response to
/// an id nobody asked for.
const FAKE_SERVER: &str = r##"
read -r init
id=$(printf '%s' "$init" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"fake-memorymesh","version":"0.0.1"},"capabilities":{"tools":{}}}}\n' "$id"
read -r initialized
case "$initialized" in
  *notifications/initialized*) ;;
  *) exit 3 ;;
esac
while read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"name":"fail"'*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32603,"message":"tool failed"}}\n' "$id" ;;
    *'"tools/call"'*)
      printf '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}\n'
      printf '{"jsonrpc":"2.0","id":"srv-1","method":"ping"}\n'
      read -r pong
      case "$pong" in
        *'"srv-1"'*'"result"'*)
          printf '{"jsonrpc":"2.0","id":%s,"result":{"requestId":%s,"content":[{"type":"text","text":"found"}]}}\n' "$id" "$id" ;;
        *)
          printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32000,"message":"ping unanswered"}}\n' "$id" ;;
      esac ;;
    *'"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":999,"result":{}}\n'
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"search_memory"}]}}\n' "$id" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"echo":true}}\n' "$id" ;;
  esac
done
"##;

/// Completes the handshake and exits straight away.
const EXITS_AFTER_HANDSHAKE: &str = r##"
read -r init
printf '{"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"short-lived"}}}\n'
read -r initialized
exit 0
"##;

/// Rejects `initialize`.
const REJECTS_INITIALIZE: &str = r##"
read -r init
printf '{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"unsupported protocol"}}\n'
"##;

/// Completes the handshake, then ignores stdin EOF and never exits.
const IGNORES_EOF: &str = r##"
read -r init
printf '{"jsonrpc":"2.0","id":1,"result":{}}\n'
read -r initialized
exec sleep 60
"##;

/// Writes bytes that are not UTF-8 to stderr, then keeps logging to stderr
/// while answering every request with `{"ok": true}`.
const NOISY_STDERR: &str = r##"
read -r init
printf '{"jsonrpc":"2.0","id":1,"result":{}}\n'
read -r initialized
printf '\377\376 binary noise\n' >&2
while read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  sleep 0.2
  printf 'still logging\n' >&2
  printf '{"jsonrpc":"2.0","id":%s,"result":{"ok":true}}\n' "$id"
done
"##;

/// Records SIGTERM in `$TERM_MARKER` and keeps running after stdin EOF.
const TRAPS_SIGTERM: &str = r##"
trap 'echo term > "$TERM_MARKER"; exit 0' TERM
read -r init
printf '{"jsonrpc":"2.0","id":1,"result":{}}\n'
read -r initialized
while :; do sleep 0.1; done
"##;

/// Reads one request after the handshake and exits without answering.
const DIES_MID_CALL: &str = r##"
read -r init
printf '{"jsonrpc":"2.0","id":1,"result":{}}\n'
read -r initialized
read -r request
exit 0
"##;

fn scripted(script: &str) -> BackendSession {
    BackendSession::new(BackendCommand::new("sh").with_args(["-c", script]))
        .with_handshake_timeout(Duration::from_secs(5))
        .with_shutdown_grace(Duration::from_secs(2))
}

// ── Handshake ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_returns_initialize_result_and_connects() {
    // Arrange
    let session = scripted(FAKE_SERVER);
    let status = session.subscribe();

    // Act
    let init = session.start().await.unwrap();

    // Assert
    assert_eq!(init["serverInfo"]["name"], "fake-memorymesh");
    assert_eq!(init["protocolVersion"], "2024-11-05");
    assert!(session.is_connected());
    assert!(*status.borrow());

    session.stop().await;
}

#[tokio::test]
async fn test_rejected_initialize_fails_start() {
    let session = scripted(REJECTS_INITIALIZE);

    let err = session.start().await.unwrap_err();

    assert!(
        matches!(err, SessionError::Connection(ref msg) if msg.contains("initialize rejected")),
        "unexpected error: {err}"
    );
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_backend_exiting_before_handshake_fails_start() {
    let session = scripted("exit 0");

    let err = session.start().await.unwrap_err();

    assert!(matches!(err, SessionError::Connection(_)));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_silent_backend_times_out_handshake() {
    // Arrange
    let session = scripted("exec sleep 60").with_handshake_timeout(Duration::from_millis(200));

    // Act
    let started = Instant::now();
    let err = session.start().await.unwrap_err();

    // Assert
    assert!(matches!(err, SessionError::Connection(ref msg) if msg.contains("timed out")));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_second_start_while_running_is_refused() {
    let session = scripted(FAKE_SERVER);
    session.start().await.unwrap();

    let err = session.start().await.unwrap_err();

    assert!(matches!(err, SessionError::Connection(ref msg) if msg.contains("already running")));
    assert!(session.is_connected());
    session.stop().await;
}

// ── Requests ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tool_call_answers_backend_ping_and_correlates_by_id() {
    // Arrange
    let session = scripted(FAKE_SERVER);
    session.start().await.unwrap();

    // Act
    let result = session.search_memory("dragon").await.unwrap();

    // Assert: initialize used id 1, so the first call is id 2
    assert_eq!(result["requestId"], 2);
    assert_eq!(result["content"][0]["text"], "found");

    session.stop().await;
}

#[tokio::test]
async fn test_stray_response_is_skipped() {
    let session = scripted(FAKE_SERVER);
    session.start().await.unwrap();

    let tools = session.list_tools().await.unwrap();

    assert_eq!(tools, json!({"tools": [{"name": "search_memory"}]}));
    session.stop().await;
}

#[tokio::test]
async fn test_jsonrpc_error_becomes_backend_error() {
    let session = scripted(FAKE_SERVER);
    session.start().await.unwrap();

    let err = session.call_tool("fail", json!({})).await.unwrap_err();

    assert_eq!(err, SessionError::Backend("tool failed".to_string()));
    // The session survives a failed call.
    assert!(session.is_connected());
    assert_eq!(
        session.read_resource("memory://graph").await.unwrap(),
        json!({"echo": true})
    );
    session.stop().await;
}

#[tokio::test]
async fn test_non_utf8_stderr_does_not_break_the_session() {
    // Arrange
    let session = scripted(NOISY_STDERR);
    session.start().await.unwrap();

    // Act: each call makes the backend write to stderr again
    let first = session.call_tool("search_memory", json!({"query": "a"})).await;
    let second = session.call_tool("search_memory", json!({"query": "b"})).await;

    // Assert
    assert_eq!(first, Ok(json!({"ok": true})));
    assert_eq!(second, Ok(json!({"ok": true})));
    assert!(session.is_connected());
    session.stop().await;
}

#[tokio::test]
async fn test_backend_dying_mid_call_is_a_backend_error() {
    let session = scripted(DIES_MID_CALL);
    session.start().await.unwrap();

    let err = session.call_tool("search_memory", json!({"query": "x"})).await.unwrap_err();

    assert!(
        matches!(err, SessionError::Backend(ref msg) if msg.contains("closed its stdout")),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_concurrent_calls_are_serialized_on_one_pipe() {
    // Arrange
    let session = scripted(FAKE_SERVER);
    session.start().await.unwrap();

    // Act
    let (a, b, c) = tokio::join!(
        session.search_memory("a"),
        session.get_stats(),
        session.list_resources(),
    );

    // Assert
    assert!(a.unwrap()["requestId"].is_i64());
    assert_eq!(b.unwrap()["content"][0]["text"], "found");
    assert_eq!(c.unwrap(), json!({"echo": true}));
    session.stop().await;
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_process_exit_flips_connected_and_refuses_calls() {
    // Arrange
    let session = scripted(EXITS_AFTER_HANDSHAKE);
    let mut status = session.subscribe();
    session.start().await.unwrap();

    // Act
    let went_down = timeout(Duration::from_secs(5), status.wait_for(|connected| !connected)).await;

    // Assert
    assert!(went_down.is_ok(), "exit was not observed");
    assert!(!session.is_connected());
    assert_eq!(
        session.list_tools().await,
        Err(SessionError::NotConnected)
    );
}

#[tokio::test]
async fn test_session_can_restart_after_backend_exit() {
    let session = scripted(EXITS_AFTER_HANDSHAKE);
    let mut status = session.subscribe();
    session.start().await.unwrap();
    timeout(Duration::from_secs(5), status.wait_for(|connected| !connected))
        .await
        .unwrap()
        .unwrap();

    let init = session.start().await.unwrap();

    assert_eq!(init["serverInfo"]["name"], "short-lived");
    session.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    // Arrange
    let session = scripted(FAKE_SERVER);
    session.start().await.unwrap();

    // Act
    session.stop().await;
    session.stop().await;

    // Assert
    assert!(!session.is_connected());
    assert_eq!(
        session.call_tool("search_memory", json!({"query": "x"})).await,
        Err(SessionError::NotConnected)
    );
}

#[tokio::test]
async fn test_stop_kills_backend_that_ignores_eof() {
    // Arrange
    let session = scripted(IGNORES_EOF).with_shutdown_grace(Duration::from_millis(200));
    session.start().await.unwrap();

    // Act
    let started = Instant::now();
    session.stop().await;

    // Assert: stop does not hang on a backend that ignores stdin EOF
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_stop_sends_sigterm_before_killing() {
    // Arrange
    let marker = std::env::temp_dir().join(format!(
        "mesh-bridge-sigterm-{}-{}",
        std::process::id(),
        line!()
    ));
    let _ = std::fs::remove_file(&marker);
    let mut command = BackendCommand::new("sh").with_args(["-c", TRAPS_SIGTERM]);
    command
        .env
        .push(("TERM_MARKER".to_string(), marker.display().to_string()));
    let session = BackendSession::new(command)
        .with_handshake_timeout(Duration::from_secs(5))
        .with_shutdown_grace(Duration::from_secs(2));
    session.start().await.unwrap();

    // Act
    session.stop().await;

    // Assert: the backend's TERM handler ran
    let recorded = std::fs::read_to_string(&marker).unwrap_or_default();
    let _ = std::fs::remove_file(&marker);
    assert_eq!(recorded.trim(), "term");
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_status_watchers_see_one_change_per_stop() {
    // Arrange
    let session = scripted(FAKE_SERVER);
    session.start().await.unwrap();
    let mut status = session.subscribe();
    status.borrow_and_update();

    // Act / Assert
    session.stop().await;
    assert!(status.has_changed().unwrap());
    assert!(!*status.borrow_and_update());

    session.stop().await;
    assert!(!status.has_changed().unwrap());
}
