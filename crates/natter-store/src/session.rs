//! A single chat session: its members and its bounded history.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use natter_core::Message;

/// Maximum number of messages retained per session. Older messages are
/// evicted as new ones arrive.
pub const HISTORY_CAP: usize = 15;

/// One session's state.
///
/// `members` holds the connection ids currently joined. `history` holds the
/// most recent messages in arrival order, oldest first, and serializes under
/// the `msg` key to match the wire shape of a message list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Connection ids currently joined to this session.
    pub members: HashSet<String>,
    /// Retained messages, oldest first, at most [`HISTORY_CAP`] entries.
    #[serde(rename = "msg")]
    pub history: VecDeque<Message>,
}

impl Session {
    /// Append a message, evicting the oldest entries past [`HISTORY_CAP`].
    pub fn append(&mut self, message: Message) {
        self.history.push_back(message);
        while self.history.len() > HISTORY_CAP {
            let _ = self.history.pop_front();
        }
    }
}
