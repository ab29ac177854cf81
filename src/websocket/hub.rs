//! WebSocket Connection Hub
//!
//! Registry of active connections and the fan-out broadcaster.
//!
//! Every connection is represented by the sending half of its outbound
//! queue. Broadcasting enqueues one shared payload per member while the
//! registry lock is held; each session's writer task drains its queue into
//! the socket. A closed queue means the writer is gone, so the member is
//! pruned after the loop and the survivors get a fresh connection count.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

use super::messages::ServerMessage;

/// Unique identifier for a WebSocket connection
pub type ConnectionId = Uuid;

/// WebSocket frame type a payload is written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

/// Serialized frame shared by every recipient of one broadcast
#[derive(Debug, Clone)]
pub struct Payload {
    pub kind: FrameKind,
    pub body: Arc<str>,
}

impl Payload {
    pub fn new(kind: FrameKind, body: impl Into<Arc<str>>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    pub fn text(body: impl Into<Arc<str>>) -> Self {
        Self::new(FrameKind::Text, body)
    }
}

impl std::ops::Deref for Payload {
    type Target = str;

    fn deref(&self) -> &str {
        &self.body
    }
}

/// Manages all WebSocket connections
pub struct ConnectionHub {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: Mutex<HashMap<ConnectionId, ConnectionHandle>>,
    /// Flipped to `true` when sessions must close
    shutdown: watch::Sender<bool>,
    /// Configuration
    config: HubConfig,
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
        }
    }
}

/// Handle for sending frames to a specific connection
pub struct ConnectionHandle {
    sender: mpsc::UnboundedSender<Payload>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<Payload>) -> Self {
        Self { sender }
    }

    fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    fn deliver(&self, payload: &Payload) -> bool {
        self.sender.send(payload.clone()).is_ok()
    }
}

impl ConnectionHub {
    /// Create a new connection hub
    pub fn new(config: HubConfig) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            connections: Mutex::new(HashMap::new()),
            shutdown,
            config,
        }
    }

    /// Register a connection and announce the new count to every member,
    /// the newcomer included.
    ///
    /// Registering an id that is already present is a no-op.
    pub async fn add(
        &self,
        id: ConnectionId,
        sender: mpsc::UnboundedSender<Payload>,
    ) -> Result<(), HubError> {
        let mut connections = self.connections.lock().await;
        if connections.contains_key(&id) {
            return Ok(());
        }
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        connections.insert(id, ConnectionHandle::new(sender));
        tracing::info!(connection_id = %id, connections = connections.len(), "WebSocket connected");

        announce_count(&mut connections);
        Ok(())
    }

    /// Deregister a connection and announce the new count to the rest
    pub async fn remove(&self, id: &ConnectionId) {
        let mut connections = self.connections.lock().await;
        if connections.remove(id).is_none() {
            return;
        }
        tracing::info!(connection_id = %id, connections = connections.len(), "WebSocket disconnected");

        announce_count(&mut connections);
    }

    /// Ids of the members whose connection is still open
    pub async fn snapshot(&self) -> Vec<ConnectionId> {
        self.connections
            .lock()
            .await
            .iter()
            .filter(|(_, handle)| handle.is_open())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Deliver `payload` to every member except `origin`.
    ///
    /// Returns the number of members the payload reached.
    pub async fn broadcast(&self, origin: Option<&ConnectionId>, payload: Payload) -> usize {
        let mut connections = self.connections.lock().await;
        let delivered = fan_out(&mut connections, origin, &payload);

        tracing::trace!(recipients = delivered, "Broadcast frame");
        delivered
    }

    /// Serialize and broadcast a relay-generated message as a `kind` frame
    pub async fn broadcast_message(
        &self,
        origin: Option<&ConnectionId>,
        message: &ServerMessage,
        kind: FrameKind,
    ) -> Result<usize, HubError> {
        let json = message.to_json().map_err(|e| HubError::Encode(e.to_string()))?;
        let payload = Payload::new(kind, json);
        Ok(self.broadcast(origin, payload).await)
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Receiver that observes `true` once the hub shuts down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Ask every session to close
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Enqueue `payload` for every member except `origin`, then drop members
/// whose queue has closed. Dropping a handle closes the member's queue,
/// which ends its writer task and the socket with it.
fn fan_out(
    connections: &mut HashMap<ConnectionId, ConnectionHandle>,
    origin: Option<&ConnectionId>,
    payload: &Payload,
) -> usize {
    let mut delivered = 0;
    let mut failed = Vec::new();

    for (id, handle) in connections.iter() {
        if Some(id) == origin {
            continue;
        }
        if handle.deliver(payload) {
            delivered += 1;
        } else {
            failed.push(*id);
        }
    }

    if !failed.is_empty() {
        for id in &failed {
            connections.remove(id);
            tracing::debug!(connection_id = %id, "Dropped connection after failed write");
        }
        announce_count(connections);
    }

    delivered
}

/// Broadcast the connection count to every member
fn announce_count(connections: &mut HashMap<ConnectionId, ConnectionHandle>) {
    let message = ServerMessage::Connection {
        connection_count: connections.len(),
    };
    match message.to_json() {
        Ok(json) => {
            let payload = Payload::text(json);
            // Recurses only while members keep failing; every pass shrinks the map
            fan_out(connections, None, &payload);
        }
        Err(e) => tracing::error!(error = %e, "Failed to encode connection count"),
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}
