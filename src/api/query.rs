use crate::block::Block;
use crate::store::{BlockStore, StoreError};
use crate::subscription::SubscriberRegistry;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Shared state for query API
pub struct QueryAppState {
    pub store: Arc<dyn BlockStore>,
    pub subscribers: Arc<SubscriberRegistry>,
}

/// Health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub subscribers: usize,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create query API router
pub fn create_query_router(state: Arc<QueryAppState>) -> Router {
    Router::new()
        .route("/api/blocks", get(list_blocks))
        .route("/api/health", get(health))
        .with_state(state)
}

/// GET /api/blocks - Current block collection
async fn list_blocks(
    State(state): State<Arc<QueryAppState>>,
) -> Result<Json<Vec<Block>>, QueryError> {
    let blocks = state.store.load_all().await?;
    Ok(Json(blocks))
}

/// GET /api/health - Liveness and subscriber count
async fn health(State(state): State<Arc<QueryAppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        subscribers: state.subscribers.count(),
    })
}

/// Query error types
#[derive(Debug)]
enum QueryError {
    Store(StoreError),
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        QueryError::Store(err)
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            QueryError::Store(e) => {
                error!(error = %e, "Failed to load blocks");
                (StatusCode::SERVICE_UNAVAILABLE, "Block store unavailable")
            }
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
        });

        (status, body).into_response()
    }
}
