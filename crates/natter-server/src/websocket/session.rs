//! WebSocket connection lifecycle: one connected client from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::relay::Relay;
use crate::websocket::connection::ClientConnection;
use crate::websocket::handler::handle_frame;
use crate::websocket::registry::ClientRegistry;

/// Run the lifecycle of one connected client.
///
/// 1. Spawns the outbound forwarder (send queue to socket, plus pings)
/// 2. Feeds incoming text frames to the relay
/// 3. Disconnects clients that stop answering pings
/// 4. On teardown, removes the connection from its session and the registry
#[instrument(skip_all, fields(conn_id = %connection.id))]
pub async fn run_connection(
    ws: WebSocket,
    connection: Arc<ClientConnection>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    relay: Arc<Relay>,
    registry: Arc<ClientRegistry>,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let conn_id = connection.id.clone();

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Spawn outbound forwarder with periodic Ping frames.
    let outbound_conn = Arc::clone(&connection);
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    match frame {
                        Some(json) => {
                            if ws_tx.send(WsMessage::Text(json.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    // Check if the client responded to the previous ping
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > heartbeat_timeout
                    {
                        warn!("client unresponsive for {heartbeat_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        // Shut the write half so the read loop below wakes up and tears
        // the connection down.
        let _ = ws_tx.close().await;
    });

    // Process incoming frames until the client goes away.
    while let Some(Ok(frame)) = ws_rx.next().await {
        match frame {
            WsMessage::Text(text) => handle_frame(text.as_str(), &conn_id, &relay).await,
            WsMessage::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => handle_frame(text, &conn_id, &relay).await,
                Err(_) => info!(len = data.len(), "ignoring non-UTF8 binary frame"),
            },
            WsMessage::Close(_) => {
                info!("client sent close frame");
                break;
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => connection.mark_alive(),
        }
    }

    // Leave the session first so no further fan-out targets this
    // connection, then drop the delivery handle.
    relay.disconnect(&conn_id).await;
    registry.remove(&conn_id);
    outbound.abort();

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    info!(
        duration_secs = connection.age().as_secs(),
        dropped_frames = connection.drop_count(),
        "client disconnected"
    );
}
