//! Domain registry endpoints.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::PaginationParams;
use crate::AppState;
use crate::models::{BlacklistDomainRequest, Domain};
use crate::utils::ApiResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct DomainListResponse {
    pub domains: Vec<Domain>,
    pub page: i64,
    pub size: i64,
}

// Page through registered domains, newest first.
#[utoipa::path(
    get,
    path = "/api/domains",
    params(PaginationParams),
    responses(
        (status = 200, description = "Page of registered domains", body = DomainListResponse),
        (status = 400, description = "Invalid pagination parameters")
    ),
    tag = "Domains"
)]
pub async fn list_domains(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<DomainListResponse>> {
    params.validate()?;

    let domains = state.domain_registry.list(params.page, params.size).await?;
    Ok(Json(DomainListResponse { domains, page: params.page, size: params.size }))
}

// Operator blacklisting; the pipeline never crawls the name again.
#[utoipa::path(
    post,
    path = "/api/domains/blacklist",
    request_body = BlacklistDomainRequest,
    responses(
        (status = 200, description = "Domain blacklisted", body = Domain),
        (status = 400, description = "Unregistrable domain name")
    ),
    tag = "Domains"
)]
pub async fn blacklist_domain(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BlacklistDomainRequest>,
) -> ApiResult<Json<Domain>> {
    let domain = state
        .domain_registry
        .blacklist(&req.domain, "operator", &req.reason)
        .await?;
    Ok(Json(domain))
}
