//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and runs one relay session per
//! connection: register, read and dispatch frames, deregister.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::hub::{ConnectionHub, ConnectionId, FrameKind, Payload};
use super::messages::{InboundFrame, ServerMessage};
use crate::api::AppState;
use crate::thresholds::{fetch_or_default, ThresholdPair};

/// How long a closing session waits for its writer to flush
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// WebSocket upgrade handler
///
/// Any origin is accepted.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Thresholds for one session, fetched once in the background
enum SessionThresholds {
    Pending(JoinHandle<ThresholdPair>),
    Ready(ThresholdPair),
}

impl SessionThresholds {
    fn spawn(state: &AppState) -> Self {
        let source = Arc::clone(&state.thresholds);
        let fallback = state.default_thresholds;
        SessionThresholds::Pending(tokio::spawn(async move {
            fetch_or_default(source.as_ref(), fallback).await
        }))
    }

    /// Wait for the fetch on first use, then keep the result.
    ///
    /// Returns `None` if the hub shuts down while the fetch is still running.
    async fn resolve(
        &mut self,
        fallback: ThresholdPair,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<ThresholdPair> {
        if let SessionThresholds::Pending(task) = self {
            let joined = tokio::select! {
                joined = &mut *task => joined,
                _ = shutdown.wait_for(|stopping| *stopping) => return None,
            };
            let pair = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "Threshold task failed, using defaults");
                    fallback
                }
            };
            *self = SessionThresholds::Ready(pair);
        }

        match self {
            SessionThresholds::Ready(pair) => Some(*pair),
            SessionThresholds::Pending(_) => Some(fallback),
        }
    }

    fn cancel(&self) {
        if let SessionThresholds::Pending(task) = self {
            task.abort();
        }
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let hub = Arc::clone(&state.hub);
    let connection_id: ConnectionId = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    // Outbound queue; the hub holds the only sender
    let (tx, mut rx) = mpsc::unbounded_channel::<Payload>();

    if let Err(e) = hub.add(connection_id, tx).await {
        tracing::warn!(connection_id = %connection_id, error = %e, "Rejected WebSocket connection");
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    let mut thresholds = SessionThresholds::spawn(&state);

    // Writer: drains the queue into the socket until the hub drops this
    // connection or a write fails
    let conn_id_for_send = connection_id;
    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = sender.send(to_ws_message(&payload)).await {
                tracing::debug!(
                    connection_id = %conn_id_for_send,
                    error = %e,
                    "WebSocket send failed, closing connection"
                );
                return;
            }
        }
        let _ = sender.close().await;
    });
    let mut writer_finished = false;

    let mut shutdown = hub.shutdown_signal();
    if !hub.is_shutting_down() {
        loop {
            tokio::select! {
                frame = receiver.next() => match frame {
                    Some(Ok(msg)) => {
                        if !handle_ws_message(&state, &connection_id, &mut thresholds, &mut shutdown, msg).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::debug!(
                            connection_id = %connection_id,
                            error = %e,
                            "WebSocket receive error"
                        );
                        break;
                    }
                    None => break,
                },
                _ = &mut send_task => {
                    writer_finished = true;
                    break;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!(connection_id = %connection_id, "Closing session for shutdown");
                        break;
                    }
                }
            }
        }
    }

    // Deregistering drops the queue sender, which lets the writer close the socket
    hub.remove(&connection_id).await;
    thresholds.cancel();

    if !writer_finished && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task).await.is_err() {
        send_task.abort();
    }
}

/// Outbound WebSocket frame for a queued payload
fn to_ws_message(payload: &Payload) -> Message {
    match payload.kind {
        FrameKind::Text => Message::Text(payload.body.to_string()),
        FrameKind::Binary => Message::Binary(payload.body.as_bytes().to_vec()),
    }
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
async fn handle_ws_message(
    state: &AppState,
    connection_id: &ConnectionId,
    thresholds: &mut SessionThresholds,
    shutdown: &mut watch::Receiver<bool>,
    message: Message,
) -> bool {
    match message {
        Message::Text(text) => {
            let raw = Payload::text(text.as_str());
            dispatch_frame(state, connection_id, thresholds, shutdown, text.as_bytes(), raw).await
        }
        Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => {
                let raw = Payload::new(FrameKind::Binary, text);
                dispatch_frame(state, connection_id, thresholds, shutdown, &bytes, raw).await
            }
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Ignoring non UTF-8 binary frame");
                true
            }
        },
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}

/// Decode one frame and relay it. Undecodable frames are logged and dropped.
///
/// Returns false if the hub shut down while the frame was in flight.
async fn dispatch_frame(
    state: &AppState,
    connection_id: &ConnectionId,
    thresholds: &mut SessionThresholds,
    shutdown: &mut watch::Receiver<bool>,
    bytes: &[u8],
    raw: Payload,
) -> bool {
    let frame = match InboundFrame::decode(bytes) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(
                connection_id = %connection_id,
                error = %e,
                "Invalid client frame"
            );
            return true;
        }
    };

    match frame {
        InboundFrame::Time(_) => {
            state.hub.broadcast(None, raw).await;
        }
        InboundFrame::Data(reading) => {
            let Some(pair) = thresholds.resolve(state.default_thresholds, shutdown).await else {
                tracing::debug!(
                    connection_id = %connection_id,
                    "Shutdown while waiting for thresholds, dropping reading"
                );
                return false;
            };
            let message = ServerMessage::Data(reading.enrich(&pair, Utc::now()));
            relay(&state.hub, connection_id, &message, raw.kind).await;
        }
    }
    true
}

async fn relay(hub: &ConnectionHub, origin: &ConnectionId, message: &ServerMessage, kind: FrameKind) {
    if let Err(e) = hub.broadcast_message(Some(origin), message, kind).await {
        tracing::error!(connection_id = %origin, error = %e, "Failed to relay reading");
    }
}
