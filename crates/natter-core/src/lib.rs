//! # natter-core
//!
//! Shared types for the natter chat relay: the [`Message`] record with its
//! field limits, and the JSON events exchanged between clients and the
//! server.

#![deny(unsafe_code)]

pub mod events;
pub mod message;

pub use events::{ClientEvent, MessageParams, ServerEvent};
pub use message::{BODY_MAX_CHARS, Message, NAME_MAX_CHARS};
