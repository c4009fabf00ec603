//! `WebSocket` handler for the live multiverse stream.
//!
//! Clients connect to `GET /ws/updates` and receive one text frame per tick
//! holding the JSON array of `{cells, colour}` universes.
//!
//! Each client is a [`Connection`] registered with the [`Hub`]. The
//! connection owns a bounded queue of `ws_queue_capacity` payloads; when the
//! client cannot keep up the oldest queued payload is dropped and the client
//! resumes from the most recent tick. A frame the client does not accept
//! within the write timeout ends the connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use multiverse_core::config::MAX_WS_QUEUE_CAPACITY;
use tokio::sync::{Notify, broadcast};
use tracing::{debug, info};

use crate::hub::{ConnectionId, Hub, Payload, Sink, SinkError};
use crate::state::AppState;

/// Hub sink backed by a per-client bounded queue.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    tx: broadcast::Sender<Payload>,
    closed: AtomicBool,
    close_signal: Notify,
}

impl Connection {
    /// Create a connection and the receiving end of its queue.
    ///
    /// The queue length is clamped to `1..=MAX_WS_QUEUE_CAPACITY`.
    pub fn new(queue_capacity: usize) -> (Arc<Self>, broadcast::Receiver<Payload>) {
        let (tx, rx) = broadcast::channel(queue_capacity.clamp(1, MAX_WS_QUEUE_CAPACITY));
        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            tx,
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        });
        (connection, rx)
    }

    /// Whether [`Sink::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolve once the connection is closed.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_signal.notified().await;
    }
}

impl Sink for Connection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, payload: Payload) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed(self.id));
        }
        // Errs only once the receiving task has dropped its end.
        self.tx
            .send(payload)
            .map(|_| ())
            .map_err(|_send_err| SinkError::Closed(self.id))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_signal.notify_one();
        }
    }
}

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming multiverse updates.
///
/// # Route
///
/// `GET /ws/updates`
pub async fn ws_updates(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Register with the hub, forward queued payloads as text frames, and
/// unregister when either side hangs up.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let (connection, mut rx) = register(&state.hub, state.ws_queue_capacity);
    let write_timeout = state.timeouts.write;
    let id = connection.id();
    info!(%id, "WebSocket client connected");

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(payload) => {
                        let msg = Message::Text(payload.to_string().into());
                        if !send_frame(&mut socket, msg, write_timeout).await {
                            debug!(%id, "WebSocket client dropped (send failed or timed out)");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(%id, skipped = n, "WebSocket client lagged, dropped oldest updates");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%id, "WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if !send_frame(&mut socket, Message::Pong(data), write_timeout).await {
                            debug!(%id, "WebSocket client disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(%id, error = %e, "WebSocket error");
                        break;
                    }
                    // Clients have nothing to say on this stream.
                    Some(Ok(_)) => {}
                }
            }
            () = connection.closed() => {
                debug!(%id, "Connection closed by hub");
                break;
            }
        }
    }

    state.hub.remove_connection(id);
    // The peer may already be gone.
    send_frame(&mut socket, Message::Close(None), write_timeout).await;
    info!(%id, remaining = state.hub.len(), "WebSocket client finished");
}

/// Send one frame, giving up after `limit`. Returns whether it was sent.
async fn send_frame(socket: &mut WebSocket, msg: Message, limit: Duration) -> bool {
    matches!(tokio::time::timeout(limit, socket.send(msg)).await, Ok(Ok(())))
}

/// Register a fresh connection with `hub`, returning it with its queue.
///
/// Used by the upgrade handler and by tests that drive the hub without a
/// socket.
pub fn register(hub: &Hub, queue_capacity: usize) -> (Arc<Connection>, broadcast::Receiver<Payload>) {
    let (connection, rx) = Connection::new(queue_capacity);
    hub.add_connection(connection.clone());
    (connection, rx)
}
