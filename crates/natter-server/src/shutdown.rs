//! Shutdown sequencing: stop accepting, snapshot sessions, drain tasks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::relay::Relay;

/// How long to wait for connection tasks before abandoning them.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives the exit sequence for a running server.
///
/// Everything that must happen between the shutdown trigger and process
/// exit lives here: cancelling the accept loop, writing the session
/// snapshot, and waiting a bounded time for connection tasks to finish.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    relay: Arc<Relay>,
    snapshot_path: PathBuf,
}

impl ShutdownCoordinator {
    /// Create a coordinator that snapshots `relay`'s sessions to
    /// `snapshot_path` during shutdown.
    pub fn new(relay: Arc<Relay>, snapshot_path: PathBuf) -> Self {
        Self {
            token: CancellationToken::new(),
            relay,
            snapshot_path,
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown without running the snapshot or the drain.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run the full shutdown sequence.
    ///
    /// 1. Cancel the token, which stops the accept loop
    /// 2. Write the session snapshot, members cleared first
    /// 3. Wait up to `timeout` for `handles` to complete
    ///
    /// Lingering tasks are abandoned after the timeout so the process can
    /// always exit.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();

        // Best effort. A failed write is logged and the drain still runs.
        if let Err(e) = self.relay.persist(&self.snapshot_path).await {
            error!(
                error = %e,
                path = %self.snapshot_path.display(),
                "snapshot write failed"
            );
        }

        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "draining connection tasks"
        );
        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("drain timed out after {timeout:?}, abandoning remaining tasks");
        }
    }
}
