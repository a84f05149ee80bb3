//! Discovery session endpoints: listing, detail, cancel, and the
//! legacy trigger route.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::PaginationParams;
use super::search::{SearchExecuteResponse, parse_engines};
use crate::AppState;
use crate::models::{DiscoverySessionResponse, FundingCategory, SessionType};
use crate::services::DiscoveryRequest;
use crate::utils::{ApiError, ApiResult};

/// Engine names the legacy trigger accepts.
const LEGACY_ENGINES: [&str; 3] = ["searxng", "tavily", "perplexity"];

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListResponse {
    pub sessions: Vec<DiscoverySessionResponse>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}

// List discovery sessions, newest first, RUNNING included.
#[utoipa::path(
    get,
    path = "/api/discovery/sessions",
    params(PaginationParams),
    responses(
        (status = 200, description = "Page of discovery sessions", body = SessionListResponse),
        (status = 400, description = "Invalid pagination parameters")
    ),
    tag = "Discovery"
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<SessionListResponse>> {
    params.validate()?;

    let (sessions, total) = state.session_service.list(params.page, params.size).await?;
    Ok(Json(SessionListResponse {
        sessions: sessions.into_iter().map(DiscoverySessionResponse::from).collect(),
        total,
        page: params.page,
        size: params.size,
    }))
}

// Get one session with expanded statistics.
#[utoipa::path(
    get,
    path = "/api/discovery/sessions/{id}",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session details", body = DiscoverySessionResponse),
        (status = 404, description = "Session not found")
    ),
    tag = "Discovery"
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DiscoverySessionResponse>> {
    let session = state
        .session_service
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("session not found: {}", id)))?;
    Ok(Json(session.into()))
}

// Cancel a RUNNING session; fan-out stops before the next batch.
#[utoipa::path(
    post,
    path = "/api/discovery/sessions/{id}/cancel",
    params(("id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session cancelled", body = DiscoverySessionResponse),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is not RUNNING")
    ),
    tag = "Discovery"
)]
pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DiscoverySessionResponse>> {
    let session = state.session_service.cancel(&id).await?;
    Ok(Json(session.into()))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDiscoveryRequest {
    #[serde(default)]
    pub engines: Option<Vec<String>>,
    #[serde(default = "default_categories")]
    pub categories: Vec<FundingCategory>,
    #[serde(default = "default_geography")]
    pub geography: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_categories() -> Vec<FundingCategory> {
    vec![FundingCategory::Education, FundingCategory::CommunityDevelopment]
}

fn default_geography() -> String {
    "Bulgaria".to_string()
}

fn default_max_results() -> u32 {
    10
}

// Legacy trigger: same pipeline, engine names whitelisted.
#[utoipa::path(
    post,
    path = "/api/discovery/trigger",
    request_body = TriggerDiscoveryRequest,
    responses(
        (status = 202, description = "Discovery session accepted", body = SearchExecuteResponse),
        (status = 400, description = "Engine name outside the legacy whitelist")
    ),
    tag = "Discovery"
)]
pub async fn trigger_discovery(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TriggerDiscoveryRequest>,
) -> ApiResult<impl IntoResponse> {
    let names = req
        .engines
        .unwrap_or_else(|| LEGACY_ENGINES.iter().map(|s| s.to_string()).collect());

    for name in &names {
        if !LEGACY_ENGINES.contains(&name.to_lowercase().as_str()) {
            return Err(ApiError::validation_error(format!(
                "engine '{}' is not allowed here; valid engines: {}",
                name,
                LEGACY_ENGINES.join(", ")
            )));
        }
    }
    let engines = parse_engines(&names)?;

    let started = state
        .discovery_service
        .start(DiscoveryRequest {
            session_type: SessionType::Scheduled,
            engines,
            categories: req.categories,
            geography: req.geography,
            recipient: None,
            mechanism: None,
            beneficiary: None,
            queries_per_engine: 5,
            max_results: req.max_results,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SearchExecuteResponse {
            session_id: started.session_id,
            queries_count: started.queries_count,
        }),
    ))
}
