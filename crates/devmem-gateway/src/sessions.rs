use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use devmem_store::{NewSession, Session, Summary};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Sessions still open after this many hours are ended by the cleanup route.
const STALE_SESSION_HOURS: u32 = 24;

/// Body of `POST /api/summaries`.
#[derive(Debug, Deserialize)]
pub struct NewSummary {
    /// Session the summary belongs to; must exist.
    pub session_id: String,
    /// Summary body.
    pub text: String,
}

/// Query string of `GET /api/summaries/recent`.
#[derive(Debug, Default, Deserialize)]
pub struct RecentSummariesParams {
    /// Zero means the default of 10.
    #[serde(default)]
    pub limit: usize,
}

fn session_not_found(id: &str) -> ApiError {
    ApiError::not_found(format!("session {id} not found"))
}

/// `POST /api/sessions`
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewSession>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if body.id.trim().is_empty() {
        return Err(ApiError::bad_request("id must not be empty"));
    }
    state.db.insert_session(&body)?;
    info!(session = %body.id, project = %body.project, "Session started");
    Ok((StatusCode::CREATED, Json(json!({ "id": body.id }))))
}

/// `GET /api/sessions` (active only)
pub async fn list_active(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Session>>> {
    Ok(Json(state.db.list_active_sessions()?))
}

/// `GET /api/sessions/{id}`
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    state
        .db
        .get_session(&id)?
        .map(Json)
        .ok_or_else(|| session_not_found(&id))
}

/// `POST /api/sessions/{id}/end`
pub async fn end(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.db.end_session(&id)? {
        return Err(session_not_found(&id));
    }
    info!(session = %id, "Session ended");
    Ok(Json(json!({ "status": "ended" })))
}

/// `POST /api/sessions/{id}/message-count`
pub async fn increment_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.db.increment_message_count(&id)? {
        return Err(session_not_found(&id));
    }
    Ok(Json(json!({ "status": "ok" })))
}

/// `POST /api/sessions/cleanup`
pub async fn cleanup(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let ended = state.db.cleanup_stale_sessions(STALE_SESSION_HOURS)?;
    info!(ended, "Stale sessions cleaned up");
    Ok(Json(json!({ "ended": ended })))
}

/// `POST /api/summaries`
pub async fn create_summary(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewSummary>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if state.db.get_session(&body.session_id)?.is_none() {
        return Err(session_not_found(&body.session_id));
    }
    let id = state.db.insert_summary(&body.session_id, &body.text)?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// `GET /api/summaries/recent?limit=`
pub async fn recent_summaries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentSummariesParams>,
) -> ApiResult<Json<Vec<Summary>>> {
    Ok(Json(state.db.recent_summaries(params.limit)?))
}
