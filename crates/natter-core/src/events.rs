//! Wire events exchanged over the WebSocket transport.
//!
//! Every frame is a JSON object of the form `{"event": ..., "data": ...}`.
//! Clients send [`ClientEvent`]s; the server answers with [`ServerEvent`]s.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Payload of an inbound `message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageParams {
    /// Author display name as supplied by the client.
    pub name: String,
    /// Message text as supplied by the client.
    #[serde(rename = "msg")]
    pub body: String,
}

/// Events a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ClientEvent {
    /// Join a session by id, creating it if it does not exist yet.
    Join(String),
    /// Publish a message to the sender's current session.
    Message(MessageParams),
}

/// Events the server sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Replay of a session's retained history, oldest first. Sent once to
    /// the joining connection.
    History(Vec<Message>),
    /// A message published by another member of the session.
    Message(Message),
}
