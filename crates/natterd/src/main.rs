//! # natterd
//!
//! Chat relay server binary. Wires the session store, relay, and
//! HTTP/WebSocket server together and runs until interrupted.
//!
//! Session history is loaded from the snapshot file at startup and written
//! back on Ctrl-C. A missing snapshot means a fresh start; a corrupt one is
//! fatal so a bad file never silently wipes history.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use natter_server::config::{ServerConfig, apply_env_overrides};
use natter_server::metrics::install_recorder;
use natter_server::relay::Relay;
use natter_server::server::NatterServer;
use natter_server::websocket::registry::ClientRegistry;
use natter_store::SessionStore;

/// Chat relay server.
#[derive(Parser, Debug)]
#[command(name = "natterd", about = "Session-scoped chat relay server")]
struct Cli {
    /// Host to bind (overrides `NATTER_HOST`, default `0.0.0.0`).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides `NATTER_PORT`, default `5465`; `0` for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Snapshot file for session history (overrides `NATTER_SNAPSHOT`,
    /// default `history.json`).
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Log level when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Overlay any flags that were given on top of `config`.
    fn apply_to(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = &self.snapshot {
            config.snapshot_path = path.clone();
        }
    }
}

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at startup. Subsequent calls are no-ops.
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default is a no-op if already set
    let _ = subscriber.try_init();
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        // A bare filename has an empty parent; nothing to create.
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Load the session snapshot. A missing file means a fresh start; a corrupt
/// one refuses startup. Delete or repair the file to proceed.
fn load_store(path: &Path) -> Result<SessionStore> {
    SessionStore::load(path)
        .with_context(|| format!("Failed to load snapshot {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_logging(&args.log_level);

    // Precedence: defaults, then NATTER_* environment, then flags.
    let mut config = ServerConfig::default();
    apply_env_overrides(&mut config);
    args.apply_to(&mut config);

    ensure_parent_dir(&config.snapshot_path)?;
    let store = load_store(&config.snapshot_path)?;

    let metrics_handle = install_recorder();
    let registry = Arc::new(ClientRegistry::new(config.send_queue_capacity));
    let relay = Arc::new(Relay::new(store, Arc::clone(&registry)));
    let server = NatterServer::new(config.clone(), relay, registry, metrics_handle);

    let (addr, handle) = server
        .listen()
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    tracing::info!(%addr, snapshot = %config.snapshot_path.display(), "natterd ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down...");

    // Snapshots the store, then drains; a failed write never blocks exit.
    server.shutdown().graceful_shutdown(vec![handle], None).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
