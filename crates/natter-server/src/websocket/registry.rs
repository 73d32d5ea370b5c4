//! Registry of live connections for outbound delivery.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use natter_core::ServerEvent;

use crate::metrics::SEND_QUEUE_DROPS_TOTAL;
use crate::websocket::connection::ClientConnection;

/// Live connections indexed by connection id.
///
/// The relay decides which connections receive an event; the registry owns
/// the send handles that get it there. Lookups are lock-free so fan-out can
/// run inside the relay's critical section without blocking on delivery.
pub struct ClientRegistry {
    connections: DashMap<String, Arc<ClientConnection>>,
    send_queue_capacity: usize,
}

impl ClientRegistry {
    /// Create a registry whose connections each buffer up to
    /// `send_queue_capacity` outbound frames.
    pub fn new(send_queue_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            send_queue_capacity,
        }
    }

    /// Register a new connection under a fresh id.
    ///
    /// Returns the connection and the receiving half of its send queue,
    /// which the socket's write task drains.
    pub fn register(&self) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let id = format!("conn_{}", Uuid::now_v7());
        let (tx, rx) = mpsc::channel(self.send_queue_capacity);
        let connection = Arc::new(ClientConnection::new(id.clone(), tx));
        let _ = self.connections.insert(id, Arc::clone(&connection));
        (connection, rx)
    }

    /// Remove a connection by id. Unknown ids are a no-op.
    pub fn remove(&self, conn_id: &str) {
        let _ = self.connections.remove(conn_id);
    }

    /// Send a pre-serialized frame to one connection.
    ///
    /// Returns `false` when the connection is unknown or its queue refused
    /// the frame; refusals are counted as drops.
    pub fn send_raw(&self, conn_id: &str, frame: Arc<String>) -> bool {
        let Some(connection) = self.connections.get(conn_id) else {
            return false;
        };
        if connection.send(frame) {
            true
        } else {
            counter!(SEND_QUEUE_DROPS_TOTAL).increment(1);
            warn!(conn_id, "send queue refused frame, dropping");
            false
        }
    }

    /// Serialize an event and send it to one connection.
    pub fn send_event(&self, conn_id: &str, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(json) => self.send_raw(conn_id, Arc::new(json)),
            Err(e) => {
                warn!(conn_id, error = %e, "failed to serialize event");
                false
            }
        }
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}
