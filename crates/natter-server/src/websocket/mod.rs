//! WebSocket transport.
//!
//! - [`connection`]: per-client send handle and liveness state
//! - [`registry`]: live connections indexed by id
//! - [`handler`]: inbound frame parsing and dispatch to the relay
//! - [`session`]: the per-connection lifecycle task

pub mod connection;
pub mod handler;
pub mod registry;
pub mod session;
