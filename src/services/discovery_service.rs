//! Discovery Service
//!
//! The session driver: query generation, search fan-out, candidate
//! processing, and statistics write-back, from RUNNING all the way to
//! COMPLETED/FAILED. The REST layer spawns `run_session` as a
//! background task and immediately answers 202.

use std::sync::Arc;

use crate::models::{
    FundingCategory, GeneratedQueries, QueryRequest, SearchEngine, SessionType,
};
use crate::services::candidate_processor::CandidateProcessor;
use crate::services::query_generation::{GenerationError, QueryGenerationService};
use crate::services::search_orchestrator::{EngineQuery, SearchOrchestrator};
use crate::services::session_service::{SessionBatchStats, SessionService};
use crate::utils::{ApiError, ApiResult};

/// Queries per orchestrator batch; cancellation is honored between
/// batches, in-flight batches complete normally.
const QUERIES_PER_BATCH: usize = 4;

#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub session_type: SessionType,
    pub engines: Vec<SearchEngine>,
    pub categories: Vec<FundingCategory>,
    pub geography: String,
    pub recipient: Option<String>,
    pub mechanism: Option<String>,
    pub beneficiary: Option<String>,
    pub queries_per_engine: u32,
    pub max_results: u32,
}

#[derive(Debug, Clone)]
pub struct StartedDiscovery {
    pub session_id: String,
    pub queries_count: usize,
}

#[derive(Clone)]
pub struct DiscoveryService {
    generation: Arc<QueryGenerationService>,
    orchestrator: Arc<SearchOrchestrator>,
    processor: Arc<CandidateProcessor>,
    sessions: Arc<SessionService>,
}

impl DiscoveryService {
    pub fn new(
        generation: Arc<QueryGenerationService>,
        orchestrator: Arc<SearchOrchestrator>,
        processor: Arc<CandidateProcessor>,
        sessions: Arc<SessionService>,
    ) -> Self {
        Self { generation, orchestrator, processor, sessions }
    }

    /// Create the session, generate its queries, and kick off the
    /// asynchronous run. Only argument problems fail this call; engine
    /// trouble shows up later in the session record.
    pub async fn start(&self, request: DiscoveryRequest) -> ApiResult<StartedDiscovery> {
        if request.engines.is_empty() {
            return Err(ApiError::validation_error("at least one search engine is required"));
        }

        let base = QueryRequest {
            engine: request.engines[0],
            categories: request.categories.clone(),
            geography: request.geography.clone(),
            recipient: request.recipient.clone(),
            mechanism: request.mechanism.clone(),
            beneficiary: request.beneficiary.clone(),
            count: request.queries_per_engine,
            // The session id is written into the request after `begin`;
            // use a placeholder for validation only.
            session_id: String::new(),
        };
        // Surface argument errors before a session row exists.
        if let Err(GenerationError::InvalidRequest(msg)) = self.precheck(&base) {
            return Err(ApiError::validation_error(msg));
        }

        let engine_names: Vec<String> =
            request.engines.iter().map(|e| e.as_str().to_string()).collect();
        tracing::info!(
            "Starting {} discovery across [{}]",
            request.session_type.as_str(),
            engine_names.join(", ")
        );

        let session = self
            .sessions
            .begin(request.session_type, &request.engines, &[], Some(self.generation.model_name()))
            .await
            .map_err(|e| ApiError::internal_error(format!("failed to create session: {}", e)))?;

        let mut seeded = base;
        seeded.session_id = session.id.clone();

        let generated = self
            .generation
            .generate_for_many(&request.engines, &seeded)
            .await;

        let mut plans: Vec<GeneratedQueries> = Vec::new();
        let mut all_queries: Vec<String> = Vec::new();
        for (engine, outcome) in generated {
            match outcome {
                Ok(plan) => {
                    all_queries.extend(plan.queries.iter().cloned());
                    plans.push(plan);
                },
                Err(e) => {
                    tracing::warn!("Query generation failed for {}: {}", engine, e);
                    let _ = self
                        .sessions
                        .record_engine_error(&session.id, engine, &e.to_string())
                        .await;
                },
            }
        }

        self.sessions
            .set_queries(&session.id, &all_queries)
            .await
            .map_err(|e| ApiError::internal_error(format!("failed to record queries: {}", e)))?;

        let queries_count = all_queries.len();
        let driver = self.clone();
        let session_id = session.id.clone();
        let max_results = request.max_results;
        tokio::spawn(async move {
            driver.run_session(&session_id, plans, max_results).await;
        });

        Ok(StartedDiscovery { session_id: session.id, queries_count })
    }

    fn precheck(&self, request: &QueryRequest) -> Result<(), GenerationError> {
        use validator::Validate;
        request
            .validate()
            .map_err(|e| GenerationError::InvalidRequest(e.to_string()))
    }

    /// Drive the session to a terminal state. Never panics the spawned
    /// task; every failure lands in the session record.
    pub async fn run_session(
        &self,
        session_id: &str,
        plans: Vec<GeneratedQueries>,
        max_results: u32,
    ) {
        let queries: Vec<EngineQuery> = plans
            .iter()
            .flat_map(|plan| {
                plan.queries.iter().map(|text| EngineQuery {
                    text: text.clone(),
                    engines: vec![plan.engine],
                })
            })
            .collect();

        if queries.is_empty() {
            let _ = self
                .sessions
                .fail(session_id, &["no queries could be generated".to_string()])
                .await;
            return;
        }

        let mut any_success = false;
        let mut any_attempt = false;

        for batch in queries.chunks(QUERIES_PER_BATCH) {
            match self.sessions.is_cancelled(session_id).await {
                Ok(true) => {
                    tracing::info!("Session {} cancelled, stopping fan-out", session_id);
                    return;
                },
                Ok(false) => {},
                Err(e) => {
                    tracing::error!("Session {} state check failed: {}", session_id, e);
                    return;
                },
            }

            any_attempt = true;
            let outcome = self
                .orchestrator
                .execute_batch(batch, max_results, session_id)
                .await;
            any_success |= !outcome.successful_engines.is_empty();

            for failure in &outcome.errors {
                let _ = self
                    .sessions
                    .record_engine_error(session_id, failure.engine, failure.kind)
                    .await;
            }

            let mut batch_stats = SessionBatchStats {
                duplicates_detected: outcome
                    .engine_stats
                    .values()
                    .map(|s| s.duplicates_removed)
                    .sum(),
                ..Default::default()
            };
            for (engine, stats) in &outcome.engine_stats {
                batch_stats
                    .engine_result_counts
                    .insert(engine.as_str().to_string(), stats.raw_count);
            }

            let processing = self
                .processor
                .process_batch(session_id, outcome.results)
                .await;
            batch_stats.candidates_created = processing.candidates_created;

            if let Err(e) = self.sessions.record_batch_stats(session_id, &batch_stats).await {
                tracing::error!("Failed to record stats for session {}: {}", session_id, e);
            }
        }

        // Zero successful engine responses across the whole run fails
        // the session; partial success completes it with errors kept.
        let result = if any_attempt && !any_success {
            self.sessions
                .fail(session_id, &["no search engine produced a response".to_string()])
                .await
        } else {
            self.sessions.complete(session_id).await
        };

        if let Err(e) = result {
            tracing::error!("Failed to finalize session {}: {}", session_id, e);
        }
    }
}
