// HTTP and WebSocket APIs

pub mod query;
pub mod websocket;

pub use query::{create_query_router, QueryAppState};
pub use websocket::{create_ws_router, ws_handler, WsAppState};

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Merge all routers behind a permissive CORS layer (viewers are browser clients)
pub fn create_app(ws_state: Arc<WsAppState>, query_state: Arc<QueryAppState>) -> Router {
    Router::new()
        .merge(create_ws_router(ws_state))
        .merge(create_query_router(query_state))
        .layer(CorsLayer::permissive())
}
