pub mod handler;
pub mod registry;

use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::ServerEvent;
pub use registry::ConnectionRegistry;

/// One relayed frame: the event plus the connection that produced it, so
/// the receive side can suppress the echo back to the sender.
#[derive(Debug, Clone)]
pub struct BroadcastFrame {
    pub sender_id: Uuid,
    pub event: ServerEvent,
}

/// Process-wide relay state, injected into the router.
///
/// All connected clients share one broadcast domain; there are no
/// sub-channels per flashcard set.
pub struct RelayState {
    pub registry: ConnectionRegistry,
    pub bus: broadcast::Sender<BroadcastFrame>,
}

impl RelayState {
    pub fn new() -> Self {
        let (bus, _rx) = broadcast::channel::<BroadcastFrame>(100);
        Self {
            registry: ConnectionRegistry::new(),
            bus,
        }
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

/// Relay routes: the websocket endpoint plus health checks.
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/ws", get(handler::websocket_handler))
        .route("/api/v1/health", get(crate::handlers::health_check))
        .route("/api/v1/ready", get(crate::handlers::ready_check))
        .with_state(state)
}
