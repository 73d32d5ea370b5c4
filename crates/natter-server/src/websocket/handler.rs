//! Inbound frame parsing and dispatch.

use metrics::counter;
use tracing::warn;

use natter_core::ClientEvent;

use crate::metrics::CHAT_REJECTED_TOTAL;
use crate::relay::Relay;

/// Parse one inbound text frame and apply it to the relay.
///
/// Malformed frames and messages sent before joining are logged and
/// discarded; neither tears down the connection.
pub async fn handle_frame(text: &str, conn_id: &str, relay: &Relay) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            counter!(CHAT_REJECTED_TOTAL, "reason" => "malformed").increment(1);
            warn!(conn_id, error = %e, "discarding malformed frame");
            return;
        }
    };

    match event {
        ClientEvent::Join(session_id) => {
            relay.join(conn_id, &session_id).await;
        }
        ClientEvent::Message(params) => {
            if let Err(e) = relay.message(conn_id, &params.name, &params.body).await {
                warn!(conn_id, error = %e, "discarding message");
            }
        }
    }
}
