//! Chat message record and field limits.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Maximum length of an author name, in characters.
pub const NAME_MAX_CHARS: usize = 30;

/// Maximum length of a message body, in characters.
pub const BODY_MAX_CHARS: usize = 250;

/// A single chat message.
///
/// Messages are immutable once constructed. Both constructors apply the
/// field limits, so any `Message` that exists is already within bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Milliseconds since the Unix epoch, stamped by the server at receipt.
    pub date: i64,
    /// Author display name, at most [`NAME_MAX_CHARS`] characters.
    pub name: String,
    /// Message text, at most [`BODY_MAX_CHARS`] characters.
    #[serde(rename = "msg")]
    pub body: String,
}

impl Message {
    /// Build a message with an explicit timestamp, truncating overlong
    /// fields.
    pub fn new(date: i64, name: &str, body: &str) -> Self {
        Self {
            date,
            name: truncate_chars(name, NAME_MAX_CHARS),
            body: truncate_chars(body, BODY_MAX_CHARS),
        }
    }

    /// Build a message stamped with the current wall-clock time.
    pub fn now(name: &str, body: &str) -> Self {
        Self::new(Utc::now().timestamp_millis(), name, body)
    }
}

/// Truncate a string to at most `max` characters without splitting a
/// UTF-8 sequence.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
