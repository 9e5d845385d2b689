//! Client Correlator: many concurrent requests over one bridge WebSocket.
//!
//! Every request gets the next id from a per-client [`SequenceCounter`] and
//! an entry in the [`PendingTable`].  The entry is taken out of the table
//! exactly once, by whichever comes first:
//!
//! - the reader task, when a response with that id arrives, or
//! - the request's own deadline timer, which completes it with
//!   [`ClientError::Timeout`].
//!
//! The loser finds the entry gone and does nothing, so a late reply is
//! harmless.  A reply also aborts the entry's timer, so answered requests
//! leave no sleeping tasks behind.
//!
//! ```text
//! send_request ──► PendingTable.insert(id) ──► [mpsc] ──► writer task ──► WebSocket
//!      │                                                                     │
//!      └──► deadline timer ──┐                          reader task ◄────────┘
//!                            ▼                               │
//!                 PendingTable.complete(id) ◄────────────────┘
//! ```
//!
//! Notifications (frames with a `method` and no `id`) are fanned out to
//! [`BridgeClient::subscribe_notifications`] receivers.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mesh_core::protocol::codec::frame_text;
use mesh_core::{
    decode_server_message, encode_frame, BridgeRequest, Notification, RequestId,
    SequenceCounter, ServerMessage, UNCORRELATED_ID,
};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// How long a request waits for its reply unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Notifications buffered per subscriber before the slowest one lags.
const NOTIFICATION_BUFFER: usize = 64;

type Outcome = Result<Value, ClientError>;

// ── Pending table ─────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Entry {
    reply: oneshot::Sender<Outcome>,
    deadline: Option<AbortHandle>,
}

/// Outstanding requests, keyed by id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<RequestId, Entry>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still usable.
    fn entries(&self) -> MutexGuard<'_, HashMap<RequestId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a new entry and returns the receiving end of its completion.
    pub fn insert(&self, id: RequestId) -> oneshot::Receiver<Outcome> {
        let (reply, rx) = oneshot::channel();
        self.entries().insert(
            id,
            Entry {
                reply,
                deadline: None,
            },
        );
        rx
    }

    /// Attaches the deadline timer for `id`; it is aborted when the entry
    /// completes.  If the entry is already gone the timer is aborted now.
    pub fn set_deadline(&self, id: RequestId, timer: AbortHandle) {
        match self.entries().get_mut(&id) {
            Some(entry) => entry.deadline = Some(timer),
            None => timer.abort(),
        }
    }

    /// Removes the entry for `id` and completes it with `outcome`.
    ///
    /// Returns `false` if there was no such entry (already completed, timed
    /// out, or never issued).
    pub fn complete(&self, id: RequestId, outcome: Outcome) -> bool {
        let Some(entry) = self.entries().remove(&id) else {
            return false;
        };
        if let Some(timer) = entry.deadline {
            timer.abort();
        }
        // The caller may have stopped waiting.
        let _ = entry.reply.send(outcome);
        true
    }

    /// Removes the entry for `id` without completing it.
    pub fn remove(&self, id: RequestId) -> bool {
        match self.entries().remove(&id) {
            Some(entry) => {
                if let Some(timer) = entry.deadline {
                    timer.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

// ── Pending reply ─────────────────────────────────────────────────────────────

/// The eventual outcome of one request.
///
/// Resolves with the `result`, [`ClientError::Remote`] for an error reply, or
/// [`ClientError::Timeout`] once the deadline passes.  Dropping it does not
/// cancel the request.
#[derive(Debug)]
pub struct PendingReply {
    id: RequestId,
    reply: oneshot::Receiver<Outcome>,
}

impl PendingReply {
    /// The id the request was sent with.
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Future for PendingReply {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.reply).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// One open WebSocket: the writer task's queue and the reader's liveness flag.
struct Link {
    outbound: mpsc::UnboundedSender<WsMessage>,
    open: Arc<AtomicBool>,
}

/// A correlating client for one bridge URL.
pub struct BridgeClient {
    url: String,
    request_timeout: Duration,
    ids: SequenceCounter,
    pending: Arc<PendingTable>,
    link: Mutex<Option<Link>>,
    notifications: broadcast::Sender<Notification>,
}

impl BridgeClient {
    /// Creates a disconnected client for `url` (e.g. `ws://localhost:3000`).
    pub fn new(url: impl Into<String>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_BUFFER);
        Self {
            url: url.into(),
            request_timeout: DEFAULT_TIMEOUT,
            ids: SequenceCounter::new(),
            pending: Arc::new(PendingTable::new()),
            link: Mutex::new(None),
            notifications,
        }
    }

    /// Sets the per-request deadline.
    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` between a successful [`connect`](Self::connect) and the socket
    /// closing or [`disconnect`](Self::disconnect).
    pub fn is_connected(&self) -> bool {
        self.link()
            .as_ref()
            .is_some_and(|link| link.open.load(Ordering::SeqCst))
    }

    /// Number of requests still waiting for a reply or a timeout.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Receives every notification that arrives after this call.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Opens the WebSocket and starts the reader and writer tasks.
    ///
    /// Connecting an already connected client is a no-op.
    ///
    /// # Errors
    ///
    /// [`ClientError::Connection`] if the TCP connect or the WebSocket
    /// handshake fails.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.is_connected() {
            debug!("already connected to {}", self.url);
            return Ok(());
        }

        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Connection(format!("{}: {e}", self.url)))?;
        let (mut sink, mut source) = ws_stream.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<WsMessage>();
        let open = Arc::new(AtomicBool::new(true));

        // ── Writer task ───────────────────────────────────────────────────────
        tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                let closing = matches!(message, WsMessage::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!("send to bridge failed: {e}");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        // ── Reader task ───────────────────────────────────────────────────────
        let pending = Arc::clone(&self.pending);
        let notifications = self.notifications.clone();
        let reader_open = Arc::clone(&open);
        let url = self.url.clone();
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => route_incoming(&pending, &notifications, &text),
                    Ok(WsMessage::Binary(bytes)) => match frame_text(&bytes) {
                        Ok(text) => route_incoming(&pending, &notifications, text),
                        Err(e) => warn!("dropping binary frame: {e}"),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("connection to {url} failed: {e}");
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::SeqCst);
            info!("disconnected from {url}");
        });

        *self.link() = Some(Link { outbound, open });
        info!("connected to {}", self.url);
        Ok(())
    }

    /// Sends a request and returns a future for its reply.
    ///
    /// Must be called from within a Tokio runtime: the request's deadline
    /// timer is a spawned task.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] if there is no open connection, or
    /// [`ClientError::Codec`] if `params` cannot be serialized.
    pub fn send_request(&self, method: &str, params: Value) -> Result<PendingReply, ClientError> {
        let outbound = match self.link().as_ref() {
            Some(link) if link.open.load(Ordering::SeqCst) => link.outbound.clone(),
            _ => return Err(ClientError::NotConnected),
        };

        let id = self.ids.next();
        let frame = encode_frame(&BridgeRequest::new(id, method, params))?;
        let reply = self.pending.insert(id);
        if outbound.send(WsMessage::Text(frame)).is_err() {
            self.pending.remove(id);
            return Err(ClientError::NotConnected);
        }
        debug!(id, method, "request sent");

        let pending = Arc::clone(&self.pending);
        let after = self.request_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if pending.complete(id, Err(ClientError::Timeout { id, after })) {
                warn!(id, "request timed out after {after:?}");
            }
        });
        self.pending.set_deadline(id, timer.abort_handle());

        Ok(PendingReply { id, reply })
    }

    /// Sends a request and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`]; see [`send_request`](Self::send_request) and
    /// [`PendingReply`].
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        self.send_request(method, params)?.await
    }

    /// Routes one received frame: a reply completes its pending entry, a
    /// notification goes to subscribers, anything else is logged and dropped.
    pub fn handle_incoming(&self, text: &str) {
        route_incoming(&self.pending, &self.notifications, text);
    }

    /// Sends a Close frame and marks the client disconnected.
    ///
    /// Outstanding requests are not failed here; each one still completes
    /// through a late reply or its own timer.
    pub fn disconnect(&self) {
        let Some(link) = self.link().take() else {
            return;
        };
        link.open.store(false, Ordering::SeqCst);
        let _ = link.outbound.send(WsMessage::Close(None));
        info!(
            "disconnecting from {} ({} request(s) outstanding)",
            self.url,
            self.pending.len()
        );
    }
}

fn route_incoming(
    pending: &PendingTable,
    notifications: &broadcast::Sender<Notification>,
    text: &str,
) {
    match decode_server_message(text) {
        Ok(ServerMessage::Response(response)) if response.id == UNCORRELATED_ID => {
            match response.error() {
                Some(error) => warn!("bridge reported {error}"),
                None => debug!("uncorrelated message: {:?}", response.result()),
            }
        }
        Ok(ServerMessage::Response(response)) => {
            let id = response.id;
            let outcome = response.into_outcome().map_err(ClientError::Remote);
            if !pending.complete(id, outcome) {
                debug!(id, "reply for unknown or expired request dropped");
            }
        }
        Ok(ServerMessage::Notification(notification)) => {
            debug!("notification {}", notification.method);
            // Nobody subscribed is not an error.
            let _ = notifications.send(notification);
        }
        Err(e) => warn!("dropping unreadable frame: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::ErrorCode;
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    /// A client whose "socket" is a channel the test reads from.
    fn wired_client(timeout: Duration) -> (BridgeClient, mpsc::UnboundedReceiver<WsMessage>) {
        let client = BridgeClient::new("ws://test").with_timeout(timeout);
        let (outbound, sent) = mpsc::unbounded_channel();
        *client.link() = Some(Link {
            outbound,
            open: Arc::new(AtomicBool::new(true)),
        });
        (client, sent)
    }

    fn sent_json(sent: &mut mpsc::UnboundedReceiver<WsMessage>) -> Value {
        match sent.try_recv().unwrap() {
            WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    // ── PendingTable ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_entry_completes_exactly_once() {
        // Arrange
        let table = PendingTable::new();
        let rx = table.insert(4);

        // Act
        let first = table.complete(4, Ok(json!(1)));
        let second = table.complete(4, Ok(json!(2)));

        // Assert
        assert!(first);
        assert!(!second);
        assert_eq!(rx.await.unwrap().unwrap(), json!(1));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_completion_aborts_deadline_timer() {
        // Arrange
        let table = PendingTable::new();
        let rx = table.insert(5);
        let timer = tokio::spawn(std::future::pending::<()>());
        table.set_deadline(5, timer.abort_handle());

        // Act
        assert!(table.complete(5, Ok(json!("done"))));

        // Assert
        assert_eq!(rx.await.unwrap().unwrap(), json!("done"));
        assert!(timer.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_for_finished_entry_is_aborted_at_once() {
        let table = PendingTable::new();
        let _rx = table.insert(6);
        assert!(table.complete(6, Ok(Value::Null)));
        let timer = tokio::spawn(std::future::pending::<()>());

        table.set_deadline(6, timer.abort_handle());

        assert!(timer.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_completing_unknown_id_is_a_no_op() {
        let table = PendingTable::new();
        let _rx = table.insert(1);
        assert!(!table.complete(2, Ok(Value::Null)));
        assert!(table.contains(1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_completion_after_caller_gave_up_still_removes_entry() {
        let table = PendingTable::new();
        drop(table.insert(9));
        assert!(table.complete(9, Ok(Value::Null)));
        assert!(table.is_empty());
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_send_request_while_disconnected_is_refused() {
        // Arrange
        let client = BridgeClient::new("ws://test");

        // Act
        let result = client.send_request("ping", Value::Null);

        // Assert: refused before an id is spent
        assert!(matches!(result, Err(ClientError::NotConnected)));
        assert_eq!(client.ids.peek(), 1);
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_ids_start_at_one_and_increase() {
        // Arrange
        let (client, mut sent) = wired_client(DEFAULT_TIMEOUT);

        // Act
        let replies: Vec<PendingReply> = (0..3)
            .map(|_| client.send_request("ping", Value::Null).unwrap())
            .collect();

        // Assert
        let ids: Vec<RequestId> = replies.iter().map(PendingReply::id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        for expected in 1..=3 {
            let frame = sent_json(&mut sent);
            assert_eq!(frame["id"], expected);
            assert_eq!(frame["method"], "ping");
        }
        assert_eq!(client.pending_count(), 3);
    }

    #[tokio::test]
    async fn test_frame_carries_method_and_params() {
        let (client, mut sent) = wired_client(DEFAULT_TIMEOUT);

        let _reply = client
            .send_request("memory/search", json!({"query": "dragon"}))
            .unwrap();

        assert_eq!(
            sent_json(&mut sent),
            json!({"id": 1, "method": "memory/search", "params": {"query": "dragon"}})
        );
    }

    // ── Replies ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_reply_resolves_pending_future() {
        // Arrange
        let (client, _sent) = wired_client(DEFAULT_TIMEOUT);
        let mut reply = task::spawn(client.send_request("ping", Value::Null).unwrap());
        assert_pending!(reply.poll());

        // Act
        client.handle_incoming(r#"{"id":1,"result":{"pong":true,"timestamp":5}}"#);

        // Assert
        assert!(reply.is_woken());
        let value = assert_ready_ok!(reply.poll());
        assert_eq!(value, json!({"pong": true, "timestamp": 5}));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_error_reply_becomes_remote_error() {
        let (client, _sent) = wired_client(DEFAULT_TIMEOUT);
        let reply = client.send_request("memory/teleport", Value::Null).unwrap();

        client.handle_incoming(
            r#"{"id":1,"error":{"code":-32601,"message":"Method not found: memory/teleport","data":"memory/teleport"}}"#,
        );

        match reply.await {
            Err(ClientError::Remote(error)) => {
                assert_eq!(error.kind(), Some(ErrorCode::MethodNotFound));
                assert_eq!(error.data.as_deref(), Some("memory/teleport"));
            }
            other => panic!("expected a remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replies_resolve_out_of_order() {
        // Arrange
        let (client, _sent) = wired_client(DEFAULT_TIMEOUT);
        let first = client.send_request("memory/stats", Value::Null).unwrap();
        let second = client.send_request("ping", Value::Null).unwrap();

        // Act
        client.handle_incoming(r#"{"id":2,"result":"second"}"#);
        client.handle_incoming(r#"{"id":1,"result":"first"}"#);

        // Assert
        assert_eq!(first.await.unwrap(), json!("first"));
        assert_eq!(second.await.unwrap(), json!("second"));
    }

    #[tokio::test]
    async fn test_uncorrelated_and_unreadable_frames_are_dropped() {
        // Arrange
        let (client, _sent) = wired_client(DEFAULT_TIMEOUT);
        let _reply = client.send_request("ping", Value::Null).unwrap();

        // Act: welcome, parse error report, unknown id, garbage
        client.handle_incoming(r#"{"id":0,"result":{"type":"welcome"}}"#);
        client.handle_incoming(r#"{"id":0,"error":{"code":-32700,"message":"Parse error"}}"#);
        client.handle_incoming(r#"{"id":77,"result":null}"#);
        client.handle_incoming("not json at all");
        client.handle_incoming("[1,2,3]");

        // Assert: the real request is still waiting
        assert_eq!(client.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_notifications_reach_every_subscriber() {
        let client = BridgeClient::new("ws://test");
        let mut first = client.subscribe_notifications();
        let mut second = client.subscribe_notifications();

        client.handle_incoming(r#"{"method":"mcp/status_changed","params":{"connected":false}}"#);

        let expected = Notification::new("mcp/status_changed", json!({"connected": false}));
        assert_eq!(first.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);
    }

    // ── Deadlines ─────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_request_times_out_and_leaves_table() {
        // Arrange
        let (client, _sent) = wired_client(Duration::from_millis(100));
        let reply = client.send_request("memory/stats", Value::Null).unwrap();

        // Act
        let outcome = reply.await;

        // Assert
        assert!(matches!(
            outcome,
            Err(ClientError::Timeout { id: 1, after }) if after == Duration::from_millis(100)
        ));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_after_timeout_is_a_no_op() {
        // Arrange
        let (client, _sent) = wired_client(Duration::from_millis(100));
        let reply = client.send_request("memory/stats", Value::Null).unwrap();
        assert!(reply.await.unwrap_err().is_timeout());

        // Act
        client.handle_incoming(r#"{"id":1,"result":"too late"}"#);

        // Assert
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_after_reply_is_a_no_op() {
        // Arrange
        let (client, _sent) = wired_client(Duration::from_millis(100));
        let reply = client.send_request("ping", Value::Null).unwrap();
        client.handle_incoming(r#"{"id":1,"result":"ok"}"#);

        // Act: let the deadline pass
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Assert
        assert_eq!(reply.await.unwrap(), json!("ok"));
        assert_eq!(client.pending_count(), 0);
    }

    // ── Disconnect ────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_sends_close_and_leaves_entries_to_expire() {
        // Arrange
        let (client, mut sent) = wired_client(Duration::from_millis(100));
        let reply = client.send_request("ping", Value::Null).unwrap();
        let _ = sent.try_recv();

        // Act
        client.disconnect();

        // Assert
        assert!(!client.is_connected());
        assert!(matches!(sent.try_recv(), Ok(WsMessage::Close(None))));
        assert_eq!(client.pending_count(), 1);
        assert!(matches!(
            client.send_request("ping", Value::Null),
            Err(ClientError::NotConnected)
        ));
        assert!(reply.await.unwrap_err().is_timeout());
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn test_disconnect_when_never_connected_is_a_no_op() {
        let client = BridgeClient::new("ws://test");
        client.disconnect();
        assert!(!client.is_connected());
    }
}
