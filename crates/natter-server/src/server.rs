//! The Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::relay::Relay;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::registry::ClientRegistry;
use crate::websocket::session::run_connection;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Event router over the session store.
    pub relay: Arc<Relay>,
    /// Live connection registry.
    pub registry: Arc<ClientRegistry>,
    /// Effective server configuration.
    pub config: Arc<ServerConfig>,
    /// Handle for rendering `/metrics`.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
}

/// The relay server.
pub struct NatterServer {
    config: ServerConfig,
    relay: Arc<Relay>,
    registry: Arc<ClientRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl NatterServer {
    /// Create a new server over an already-wired relay and registry.
    ///
    /// The shutdown coordinator snapshots through `relay` to the configured
    /// snapshot path.
    pub fn new(
        config: ServerConfig,
        relay: Arc<Relay>,
        registry: Arc<ClientRegistry>,
        metrics: PrometheusHandle,
    ) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new(
            Arc::clone(&relay),
            config.snapshot_path.clone(),
        ));
        Self {
            config,
            relay,
            registry,
            shutdown,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: Arc::clone(&self.relay),
            registry: Arc::clone(&self.registry),
            config: Arc::new(self.config.clone()),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve
    /// task's handle.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = served {
                error!(error = %e, "serve loop ended with error");
            }
        });

        info!(addr = %local_addr, "relay listening");
        Ok((local_addr, handle))
    }

    /// Get the relay.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws, upgraded to the chat protocol.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let (connection, send_rx) = state.registry.register();
        run_connection(
            socket,
            connection,
            send_rx,
            Arc::clone(&state.relay),
            Arc::clone(&state.registry),
            state.config.heartbeat_interval(),
            state.config.heartbeat_timeout(),
        )
        .await;
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.relay.session_count().await;
    let resp = health::health_check(state.start_time, state.registry.count(), sessions);
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}
