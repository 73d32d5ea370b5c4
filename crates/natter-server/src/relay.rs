//! Event routing between the session store and live connections.
//!
//! All session mutation funnels through [`Relay`], which holds the
//! [`SessionStore`] behind a single async mutex. Each inbound event runs to
//! completion inside one critical section, so the order messages enter a
//! session's history is the order members see them on the wire.

use std::path::Path;
use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use natter_core::{Message, ServerEvent};
use natter_store::{SessionStore, StoreError};

use crate::metrics::{CHAT_JOINS_TOTAL, CHAT_MESSAGES_TOTAL, CHAT_REJECTED_TOTAL};
use crate::websocket::registry::ClientRegistry;

/// Errors from relay event processing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// A `message` event arrived from a connection that never joined a
    /// session.
    #[error("connection {0} sent a message before joining a session")]
    NotJoined(String),
}

/// Routes chat events: joins with history replay, message fan-out, and
/// disconnect cleanup.
pub struct Relay {
    store: Mutex<SessionStore>,
    registry: Arc<ClientRegistry>,
}

impl Relay {
    /// Create a relay over a store, which may carry snapshot-loaded
    /// history.
    pub fn new(store: SessionStore, registry: Arc<ClientRegistry>) -> Self {
        Self {
            store: Mutex::new(store),
            registry,
        }
    }

    /// Join a connection to a session and replay the session's history to
    /// that connection alone, oldest first.
    ///
    /// The session is created if it does not exist; a connection already in
    /// another session is moved.
    pub async fn join(&self, conn_id: &str, session_id: &str) {
        let mut store = self.store.lock().await;
        store.join(session_id, conn_id);
        let history = store.history(session_id);

        counter!(CHAT_JOINS_TOTAL).increment(1);
        debug!(
            conn_id,
            session_id,
            history_len = history.len(),
            "connection joined session"
        );
        let _ = self
            .registry
            .send_event(conn_id, &ServerEvent::History(history));
    }

    /// Accept a message from a joined connection.
    ///
    /// The server stamps the timestamp and truncates overlong fields, then
    /// appends the message to the session's history and fans it out to
    /// every member except the sender.
    pub async fn message(&self, conn_id: &str, name: &str, body: &str) -> Result<(), RelayError> {
        let mut store = self.store.lock().await;
        let Some(session_id) = store.session_of(conn_id).map(str::to_string) else {
            counter!(CHAT_REJECTED_TOTAL, "reason" => "not_joined").increment(1);
            return Err(RelayError::NotJoined(conn_id.to_string()));
        };

        let message = Message::now(name, body);
        let event = ServerEvent::Message(message.clone());
        store.append(&session_id, message);
        counter!(CHAT_MESSAGES_TOTAL).increment(1);

        // Serialize once and share the buffer across recipients.
        let frame = match serde_json::to_string(&event) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(session_id, error = %e, "failed to serialize message event");
                return Ok(());
            }
        };
        let mut delivered = 0usize;
        for member in store.members(&session_id) {
            if member == conn_id {
                continue;
            }
            if self.registry.send_raw(member, Arc::clone(&frame)) {
                delivered += 1;
            }
        }
        debug!(conn_id, session_id, delivered, "message fanned out");
        Ok(())
    }

    /// Drop a connection from whatever session it had joined. Connections
    /// that never joined are a no-op.
    pub async fn disconnect(&self, conn_id: &str) {
        let mut store = self.store.lock().await;
        if let Some(session_id) = store.leave(conn_id) {
            debug!(conn_id, session_id, "connection left session");
        }
    }

    /// Clear all members and write the snapshot to `path`.
    ///
    /// Member ids are process-local, so they are dropped before the write;
    /// history is kept. Run once at shutdown.
    pub async fn persist(&self, path: &Path) -> Result<(), StoreError> {
        let mut store = self.store.lock().await;
        store.clear_members();
        store.save(path)
    }

    /// Number of sessions in the store.
    pub async fn session_count(&self) -> usize {
        self.store.lock().await.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
