use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{BroadcastFrame, RelayState};
use crate::models::ClientEvent;

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayState>>,
) -> Response {
    info!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one relay connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    // Unique connection id, used for echo suppression and registry cleanup
    let connection_id = Uuid::new_v4();
    info!(
        "WebSocket connection established with connection_id: {}",
        connection_id
    );

    // Split the socket into sender and receiver
    let (mut sender, mut receiver) = socket.split();

    let bus = state.bus.clone();
    let mut rbc = bus.subscribe();
    let inbound_state = state.clone();

    // Listen to the websocket for incoming frames; joins update the
    // registry, everything else fans out to the other connections.
    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = match receiver.next().await {
                Some(Ok(Message::Text(msg))) => msg,
                Some(Ok(Message::Close(_))) | None => break,
                // Pings are answered by axum; binary and pong frames
                // carry nothing for this wire
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("Socket error on connection {}: {}", connection_id, e);
                    break;
                }
            };
            let event: ClientEvent = match serde_json::from_str(&msg) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        "Dropping malformed frame on connection {}: {}",
                        connection_id, e
                    );
                    continue;
                }
            };

            match event {
                ClientEvent::Join { user_id } => {
                    inbound_state.registry.join(connection_id, &user_id).await;
                }
                other => {
                    if let Some(event) = other.into_broadcast() {
                        let frame = BroadcastFrame {
                            sender_id: connection_id,
                            event,
                        };
                        if bus.send(frame).is_err() {
                            // No subscribers besides ourselves
                            debug!("No peers to relay to for {}", connection_id);
                        }
                    }
                }
            }
        }
    });

    // Forward broadcast frames to this client, skipping its own
    let mut recv_task = tokio::spawn(async move {
        loop {
            match rbc.recv().await {
                Ok(frame) => {
                    if frame.sender_id == connection_id {
                        continue;
                    }
                    let text = match serde_json::to_string(&frame.event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to serialize broadcast event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // Best-effort delivery: a saturated client just misses
                // the lagged events
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "Connection {} lagged, skipped {} events",
                        connection_id, skipped
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    state.registry.leave(connection_id).await;
    info!("WebSocket connection {} terminated", connection_id);
}
