use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use devmem_memory::{HybridResult, SearchQuery};
use devmem_store::{NewObservation, Observation, SearchFilter};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Query string of the keyword search endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordSearchParams {
    /// Required search text.
    pub q: Option<String>,
    /// Only return observations of this type.
    #[serde(rename = "type")]
    pub obs_type: Option<String>,
    /// Only return observations from this project.
    pub project: Option<String>,
    /// `dateStart`, inclusive.
    pub date_start: Option<String>,
    /// `dateEnd`, inclusive.
    pub date_end: Option<String>,
    /// Zero means the endpoint default.
    #[serde(default)]
    pub limit: usize,
}

/// Query string of the hybrid search endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct HybridSearchParams {
    /// Required search text.
    pub q: Option<String>,
    /// Only return observations of this type.
    #[serde(rename = "type")]
    pub obs_type: Option<String>,
    /// Only return observations from this project.
    pub project: Option<String>,
    /// Zero means the endpoint default.
    #[serde(default)]
    pub limit: usize,
}

/// Query string of the recent-observations endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RecentParams {
    /// Only return observations from this project.
    pub project: Option<String>,
    /// Zero means the endpoint default.
    #[serde(default)]
    pub limit: usize,
}

/// Query string of the timeline endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TimelineParams {
    /// Observations to include before the anchor.
    #[serde(default)]
    pub before: usize,
    /// Observations to include after the anchor.
    #[serde(default)]
    pub after: usize,
}

fn required_query(q: Option<String>) -> ApiResult<String> {
    match q {
        Some(q) if !q.trim().is_empty() => Ok(q),
        _ => Err(ApiError::bad_request("missing query parameter q")),
    }
}

/// `POST /api/observations`
///
/// The observation is stored first; indexing failures are logged and do not
/// fail the request.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewObservation>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if body.text.trim().is_empty() {
        return Err(ApiError::bad_request("text must not be empty"));
    }

    let id = state.db.insert_observation(&body)?;
    info!(id, obs_type = %body.obs_type, "Observation stored");

    if let Err(e) = state.searcher.index_observation(id).await {
        warn!(id, error = %e, "Indexing new observation failed");
    }

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// `GET /api/observations/{id}`
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Observation>> {
    state
        .db
        .get_observation(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("observation {id} not found")))
}

/// `GET /api/observations/recent?project=&limit=`
pub async fn recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> ApiResult<Json<Vec<Observation>>> {
    let rows = state
        .db
        .recent_observations(params.project.as_deref(), params.limit)?;
    Ok(Json(rows))
}

/// `GET /api/observations/search` (keyword only)
pub async fn keyword_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KeywordSearchParams>,
) -> ApiResult<Json<Vec<Observation>>> {
    let query = required_query(params.q)?;
    let rows = state.db.filtered_search(&SearchFilter {
        query,
        obs_type: params.obs_type,
        project: params.project,
        date_start: params.date_start,
        date_end: params.date_end,
        limit: params.limit,
    })?;
    Ok(Json(rows))
}

/// `GET /api/observations/hybrid-search`
pub async fn hybrid_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HybridSearchParams>,
) -> ApiResult<Json<Vec<HybridResult>>> {
    let text = required_query(params.q)?;
    let results = state
        .searcher
        .search(&SearchQuery {
            text,
            obs_type: params.obs_type,
            project: params.project,
            limit: params.limit,
        })
        .await
        .map_err(|e| ApiError::internal("search failed", &e))?;
    Ok(Json(results))
}

/// `GET /api/observations/timeline/{id}?before=&after=`
pub async fn timeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<TimelineParams>,
) -> ApiResult<Json<Vec<Observation>>> {
    let rows = state.db.timeline_around(id, params.before, params.after)?;
    Ok(Json(rows))
}
