//! # natter-store
//!
//! Session state for the chat relay: per-session bounded history, member
//! tracking with reverse lookup by connection id, and JSON snapshot
//! persistence so history survives restarts.

#![deny(unsafe_code)]

pub mod errors;
pub mod session;
pub mod store;

pub use errors::{Result, StoreError};
pub use session::{HISTORY_CAP, Session};
pub use store::SessionStore;
