//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `5465`; `0` for auto-assign).
    pub port: u16,
    /// Where session history is snapshotted on shutdown and loaded from at
    /// startup (default `"history.json"`).
    pub snapshot_path: PathBuf,
    /// Outbound frames buffered per connection before drops begin.
    pub send_queue_capacity: usize,
    /// Heartbeat ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5465,
            snapshot_path: "history.json".into(),
            send_queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
        }
    }
}

impl ServerConfig {
    /// Heartbeat ping interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Heartbeat timeout as a `Duration`.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

/// Apply `NATTER_*` environment overrides on top of the current values.
///
/// Invalid values are logged and ignored rather than failing startup.
pub fn apply_env_overrides(config: &mut ServerConfig) {
    if let Some(host) = read_env_string("NATTER_HOST") {
        config.host = host;
    }
    if let Some(port) = read_env_u16("NATTER_PORT", 1, 65535) {
        config.port = port;
    }
    if let Some(path) = read_env_string("NATTER_SNAPSHOT") {
        config.snapshot_path = PathBuf::from(path);
    }
}

/// Parse a u16 within `[min, max]`. Returns `None` outside the range or on
/// parse failure.
fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    val.trim()
        .parse::<u16>()
        .ok()
        .and_then(|n| (n >= min && n <= max).then_some(n))
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let parsed = parse_u16_range(&val, min, max);
    if parsed.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    parsed
}
