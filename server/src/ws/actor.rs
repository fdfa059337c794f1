use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::broadcast::broadcast;
use crate::ws::handler::{CLOSE_ALREADY_CONNECTED, CLOSE_GOING_AWAY};
use crate::ws::{ClientId, Connection};

/// How long teardown waits for the writer to flush queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a close frame may wait for room in a full outbound queue.
const CLOSE_ENQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Why a connection's read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent a close frame
    ClientClosed,
    /// Stream ended without a close frame
    StreamEnded,
    /// Receive error on the socket
    TransportError(String),
    /// Writer task exited, so the socket can no longer be written
    WriterClosed,
    /// No pong within the configured timeout
    PongTimeout,
    /// Server is shutting down
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => f.write_str("client closed"),
            Self::StreamEnded => f.write_str("stream ended"),
            Self::TransportError(e) => write!(f, "transport error: {}", e),
            Self::WriterClosed => f.write_str("writer closed"),
            Self::PongTimeout => f.write_str("pong timeout"),
            Self::Shutdown => f.write_str("server shutdown"),
        }
    }
}

/// Run the actor-per-connection pattern for a handshaken WebSocket.
///
/// Registers the client, then splits the socket:
/// - Writer task: owns the sink, forwards frames from the bounded outbound queue
/// - Heartbeat task: pings periodically and closes on a missing pong
/// - Reader loop (this task): relays every text frame to the other clients
///
/// The client is unregistered on every exit path once registered.
pub async fn run_connection(mut socket: WebSocket, state: AppState, client_id: ClientId) {
    let (tx, rx) = mpsc::channel::<Message>(state.ws.max_queue_size);

    let connection = Connection::new(client_id.clone(), tx.clone());
    if let Err(err) = state.connections.register(client_id.clone(), connection) {
        tracing::warn!(client_id = %client_id, error = %err, "Rejecting duplicate client id");
        let close_frame = CloseFrame {
            code: CLOSE_ALREADY_CONNECTED,
            reason: "client id already connected".into(),
        };
        let _ = socket.send(Message::Close(Some(close_frame))).await;
        return;
    }

    tracing::info!(client_id = %client_id, "WebSocket actor started");

    let (ws_sender, mut ws_receiver) = socket.split();
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));
    let mut writer_done = false;

    let (pong_tx, pong_rx) = mpsc::channel::<()>(1);
    let mut heartbeat_handle = tokio::spawn(heartbeat_task(
        tx.clone(),
        pong_rx,
        state.ws.ping_interval(),
        state.ws.pong_timeout(),
    ));

    let reason = loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                send_close(&tx, CLOSE_GOING_AWAY, "server shutting down").await;
                break CloseReason::Shutdown;
            }
            _ = &mut writer_handle => {
                writer_done = true;
                break CloseReason::WriterClosed;
            }
            timed_out = &mut heartbeat_handle => {
                break if matches!(timed_out, Ok(true)) {
                    CloseReason::PongTimeout
                } else {
                    CloseReason::WriterClosed
                };
            }
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let report = broadcast(&state.connections, text.as_str(), &client_id);
                    tracing::debug!(
                        client_id = %client_id,
                        delivered = report.delivered,
                        failed = report.failures.len(),
                        "Broadcast complete"
                    );
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(
                        client_id = %client_id,
                        bytes = data.len(),
                        "Ignoring binary frame (only text is relayed)"
                    );
                }
                // One pending pong is enough; extras are dropped
                Some(Ok(Message::Pong(_))) => {
                    let _ = pong_tx.try_send(());
                }
                // tungstenite answers pings itself
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(
                        client_id = %client_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break CloseReason::ClientClosed;
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        client_id = %client_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break CloseReason::TransportError(e.to_string());
                }
                None => break CloseReason::StreamEnded,
            }
        }
    };

    // Closed: unregister first so no new relays target this client.
    state.connections.unregister(&client_id);
    heartbeat_handle.abort();
    drop(tx);

    // Let the writer flush anything still queued (e.g. a shutdown close frame).
    if !writer_done && timeout(WRITER_DRAIN_TIMEOUT, &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }

    tracing::info!(
        client_id = %client_id,
        reason = %reason,
        "WebSocket actor stopped"
    );
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

/// Queue a close frame behind whatever is already queued, waiting up to
/// `CLOSE_ENQUEUE_TIMEOUT` for room. Returns false if it could not be queued.
async fn send_close(tx: &mpsc::Sender<Message>, code: u16, reason: &'static str) -> bool {
    match timeout(CLOSE_ENQUEUE_TIMEOUT, tx.send(close_message(code, reason))).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            tracing::warn!(close_code = code, "Outbound queue full, close frame dropped");
            false
        }
    }
}

/// Writer task: receives frames from the outbound queue and forwards them to the sink.
/// Stops after a send error or after writing a close frame.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || is_close {
            break;
        }
    }
}

/// Heartbeat task: pings every `ping_interval` and expects a pong within
/// `pong_timeout`. Returns `true` on a pong timeout, `false` if the writer went away.
/// Only a pong that arrives after a ping counts toward that ping.
async fn heartbeat_task(
    tx: mpsc::Sender<Message>,
    mut pong_rx: mpsc::Receiver<()>,
    ping_interval: Duration,
    pong_timeout: Duration,
) -> bool {
    let mut ping_timer = interval(ping_interval);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        // Discard unsolicited pongs received since the last check
        while pong_rx.try_recv().is_ok() {}

        if tx.send(Message::Ping(vec![1, 2, 3, 4].into())).await.is_err() {
            // Writer task has died; the connection is gone
            return false;
        }

        match timeout(pong_timeout, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                tracing::warn!("Pong timeout, closing connection");
                send_close(&tx, CLOSE_GOING_AWAY, "pong timeout").await;
                return true;
            }
        }
    }
}
