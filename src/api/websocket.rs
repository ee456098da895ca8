use crate::state::{MutationGateway, StateBroadcaster};
use crate::subscription::{ConnectionManager, SubscriberRegistry};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state for WebSocket handler
#[derive(Clone)]
pub struct WsAppState {
    pub broadcaster: Arc<StateBroadcaster>,
    pub gateway: MutationGateway,
    pub subscribers: Arc<SubscriberRegistry>,
}

/// GET /api/ws - WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsAppState>>,
) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Create WebSocket router
pub fn create_ws_router(state: Arc<WsAppState>) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .with_state(state)
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<WsAppState>) {
    // Subscribe before reading current state so no change falls in between
    let updates_rx = state.broadcaster.subscribe();

    let initial = match state.broadcaster.current().await {
        Ok(update) => Some(update),
        Err(e) => {
            error!(error = %e, "Failed to read blocks for new subscriber");
            None
        }
    };

    let connection_id = state.subscribers.register();
    info!(
        connection_id = %connection_id,
        subscribers = state.subscribers.count(),
        "Subscriber connected"
    );

    ConnectionManager::new(connection_id, state.gateway.clone())
        .handle(socket, updates_rx, initial)
        .await;

    state.subscribers.unregister(&connection_id);
    info!(
        connection_id = %connection_id,
        subscribers = state.subscribers.count(),
        "Subscriber disconnected"
    );
}
