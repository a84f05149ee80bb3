//! Search execution endpoint.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::AppState;
use crate::models::{FundingCategory, SearchEngine, SessionType};
use crate::services::DiscoveryRequest;
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchExecuteRequest {
    /// Engine names; case-insensitive, "perplexity" aliases PERPLEXICA.
    pub engines: Vec<String>,
    pub categories: Vec<FundingCategory>,
    pub geography: String,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub mechanism: Option<String>,
    #[serde(default)]
    pub beneficiary: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_queries_per_engine")]
    pub queries_per_engine: u32,
}

fn default_max_results() -> u32 {
    10
}

fn default_queries_per_engine() -> u32 {
    5
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchExecuteResponse {
    pub session_id: String,
    pub queries_count: usize,
}

/// Parse engine names, rejecting anything the adapter set cannot name.
pub(crate) fn parse_engines(names: &[String]) -> Result<Vec<SearchEngine>, ApiError> {
    if names.is_empty() {
        return Err(ApiError::validation_error("at least one search engine is required"));
    }

    let mut engines = Vec::with_capacity(names.len());
    for name in names {
        let engine = SearchEngine::parse_engine(name)
            .ok_or_else(|| ApiError::validation_error(format!("unknown search engine: {}", name)))?;
        if !engines.contains(&engine) {
            engines.push(engine);
        }
    }
    Ok(engines)
}

// Trigger a discovery session; the pipeline runs asynchronously.
#[utoipa::path(
    post,
    path = "/api/search/execute",
    request_body = SearchExecuteRequest,
    responses(
        (status = 202, description = "Discovery session accepted", body = SearchExecuteResponse),
        (status = 400, description = "Invalid engines, categories, or counts")
    ),
    tag = "Search"
)]
pub async fn execute_search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchExecuteRequest>,
) -> ApiResult<impl IntoResponse> {
    let engines = parse_engines(&req.engines)?;

    let started = state
        .discovery_service
        .start(DiscoveryRequest {
            session_type: SessionType::Manual,
            engines,
            categories: req.categories,
            geography: req.geography,
            recipient: req.recipient,
            mechanism: req.mechanism,
            beneficiary: req.beneficiary,
            queries_per_engine: req.queries_per_engine,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_parsing_rejects_unknown_names() {
        assert!(parse_engines(&["searxng".to_string(), "BRAVE".to_string()]).is_ok());
        assert!(parse_engines(&["altavista".to_string()]).is_err());
        assert!(parse_engines(&[]).is_err());
    }

    #[test]
    fn engine_parsing_dedups() {
        let engines =
            parse_engines(&["searxng".to_string(), "SEARXNG".to_string()]).unwrap();
        assert_eq!(engines, vec![SearchEngine::Searxng]);
    }
}
