//! # natter-server
//!
//! WebSocket chat relay: clients join a session by id, publish messages,
//! and receive every other member's messages in real time. Each session
//! keeps a short replayable history that new joiners receive on arrival.
//!
//! - `GET /ws` upgrades to the chat protocol
//! - `GET /health` and `GET /metrics` expose liveness and Prometheus stats
//! - [`relay::Relay`] serializes all session mutation behind one lock
//! - Per-connection send queues drop frames rather than block the relay
//! - Shutdown cancels the accept loop, snapshots sessions, then drains

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;
