//! The session map and its snapshot persistence.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use natter_core::Message;

use crate::errors::Result;
use crate::session::Session;

/// All sessions keyed by the client-supplied session id, plus a reverse
/// index from connection id to the session it last joined.
///
/// Sessions are created lazily on first join and never removed, so history
/// survives everyone leaving. The map grows for the life of the process;
/// an idle deployment stays small, a busy one trades memory for replay.
/// The reverse index is runtime-only state and is not part of snapshots.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
    joined: HashMap<String, String>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a snapshot file.
    ///
    /// A missing file yields an empty store. A file that exists but cannot
    /// be read or parsed is an error; the caller decides whether that is
    /// fatal.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "no snapshot file, starting empty");
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let sessions: HashMap<String, Session> = serde_json::from_str(&content)?;
        info!(?path, sessions = sessions.len(), "loaded session snapshot");
        Ok(Self {
            sessions,
            joined: HashMap::new(),
        })
    }

    /// Write every session to `path` as a JSON object keyed by session id.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(&self.sessions)?;
        std::fs::write(path, json)?;
        info!(?path, sessions = self.sessions.len(), "wrote session snapshot");
        Ok(())
    }

    /// Fetch a session by id, creating an empty one on first reference.
    pub fn get_or_create(&mut self, session_id: &str) -> &mut Session {
        self.sessions.entry(session_id.to_string()).or_default()
    }

    /// Join a connection to a session, creating the session if needed.
    ///
    /// A connection belongs to at most one session, so joining a new one
    /// removes it from the previous session's members first. Re-joining the
    /// current session is a no-op.
    pub fn join(&mut self, session_id: &str, conn_id: &str) {
        if let Some(prev) = self.joined.get(conn_id) {
            if prev != session_id {
                let prev = prev.clone();
                if let Some(session) = self.sessions.get_mut(&prev) {
                    let _ = session.members.remove(conn_id);
                }
            }
        }
        let session = self.get_or_create(session_id);
        let _ = session.members.insert(conn_id.to_string());
        let _ = self
            .joined
            .insert(conn_id.to_string(), session_id.to_string());
    }

    /// Remove a connection from the session it last joined and return that
    /// session's id. Unknown connection ids are a no-op.
    pub fn leave(&mut self, conn_id: &str) -> Option<String> {
        let session_id = self.joined.remove(conn_id)?;
        if let Some(session) = self.sessions.get_mut(&session_id) {
            let _ = session.members.remove(conn_id);
        }
        Some(session_id)
    }

    /// The session a connection last joined, if any.
    pub fn session_of(&self, conn_id: &str) -> Option<&str> {
        self.joined.get(conn_id).map(String::as_str)
    }

    /// Append a message to a session's history, evicting past the cap.
    pub fn append(&mut self, session_id: &str, message: Message) {
        self.get_or_create(session_id).append(message);
    }

    /// A session's retained history, oldest first. Empty for unknown ids.
    pub fn history(&self, session_id: &str) -> Vec<Message> {
        self.sessions
            .get(session_id)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Iterate over a session's member connection ids. Empty for unknown
    /// ids.
    pub fn members(&self, session_id: &str) -> impl Iterator<Item = &str> {
        self.sessions
            .get(session_id)
            .into_iter()
            .flat_map(|s| s.members.iter().map(String::as_str))
    }

    /// Clear every session's members and the reverse index.
    ///
    /// Connection ids are process-local, so a snapshot written afterwards
    /// records no members a future process would mistake for live ones.
    pub fn clear_members(&mut self) {
        self.joined.clear();
        for session in self.sessions.values_mut() {
            session.members.clear();
        }
    }

    /// Number of sessions, live or retained.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
