use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use devmem_memory::HybridSearcher;
use devmem_store::Database;
use tracing::{error, info};

use crate::{observations, sessions};

/// Shared application state.
pub struct AppState {
    /// Observation, session and summary storage.
    pub db: Arc<Database>,
    /// Hybrid search over the same database.
    pub searcher: Arc<HybridSearcher>,
}

/// The HTTP API over the observation store.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the router with every API route mounted.
    pub fn build(db: Arc<Database>, searcher: Arc<HybridSearcher>) -> Router {
        let state = Arc::new(AppState { db, searcher });

        Router::new()
            .route("/health", get(health_handler))
            .route("/api/observations", post(observations::create))
            .route("/api/observations/recent", get(observations::recent))
            .route("/api/observations/search", get(observations::keyword_search))
            .route(
                "/api/observations/hybrid-search",
                get(observations::hybrid_search),
            )
            .route("/api/observations/timeline/{id}", get(observations::timeline))
            .route("/api/observations/{id}", get(observations::get_one))
            .route("/api/search/reindex", post(reindex_handler))
            .route(
                "/api/sessions",
                post(sessions::create).get(sessions::list_active),
            )
            .route("/api/sessions/cleanup", post(sessions::cleanup))
            .route("/api/sessions/{id}", get(sessions::get_one))
            .route("/api/sessions/{id}/end", post(sessions::end))
            .route(
                "/api/sessions/{id}/message-count",
                post(sessions::increment_messages),
            )
            .route("/api/summaries", post(sessions::create_summary))
            .route("/api/summaries/recent", get(sessions::recent_summaries))
            .with_state(state)
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn reindex_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.searcher.rebuild_index().await {
        Ok(documents) => {
            info!(documents, "Reindex requested");
            (
                StatusCode::OK,
                Json(serde_json::json!({"status": "reindexed", "documents": documents})),
            )
        }
        Err(e) => {
            error!(error = %e, "Reindex failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "reindex failed"})),
            )
        }
    }
}
