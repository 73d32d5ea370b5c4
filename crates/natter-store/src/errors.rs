//! Error types for store operations.

use thiserror::Error;

/// Errors that can occur while loading or saving session state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read or write the snapshot file.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file exists but does not parse as a session map.
    #[error("corrupt snapshot: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
