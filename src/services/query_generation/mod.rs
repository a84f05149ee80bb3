//! Query Generation
//!
//! Turns a structured [`QueryRequest`] into provider-ready query text.
//! One strategy per engine category: keyword phrases for classical
//! engines, full-sentence prompts for AI-augmented ones. Generation is
//! stateless, concurrent-safe, and never fails past validation; every
//! model problem degrades to the configured fallback queries.

mod keyword;
mod llm_client;
mod parser;
mod prompt;
mod repository;

pub use keyword::KeywordQueryStrategy;
pub use llm_client::ChatCompletionClient;
pub use parser::parse_query_lines;
pub use prompt::PromptQueryStrategy;
pub use repository::QueryRecordRepository;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use sqlx::SqlitePool;
use validator::Validate;

use crate::config::{Config, GenerationConfig};
use crate::models::{GeneratedQueries, QueryCacheKey, QueryKind, QueryRequest, SearchEngine};
use crate::services::query_cache::QueryCache;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("language model timeout after {0}s")]
    Timeout(u64),

    #[error("unparseable model response: {0}")]
    ParseError(String),
}

/// A provider-category strategy: structured request in, query text out.
#[async_trait]
pub trait QueryStrategy: Send + Sync {
    fn kind(&self) -> QueryKind;

    async fn generate(&self, request: &QueryRequest) -> Result<Vec<String>, GenerationError>;
}

/// Render the request into the prose both strategies embed in their
/// prompts, resolving category slugs through the configured mapper.
pub(crate) fn describe_request(request: &QueryRequest, config: &GenerationConfig) -> String {
    let categories: Vec<String> = request
        .categories
        .iter()
        .map(|c| {
            config
                .category_descriptions
                .get(c.as_str())
                .cloned()
                .unwrap_or_else(|| c.as_str().replace('_', " "))
        })
        .collect();

    let mut description = format!("{} in {}", categories.join(", "), request.geography);

    if let Some(recipient) = request.recipient.as_deref().filter(|s| !s.is_empty()) {
        description.push_str(&format!(", aimed at {}", recipient));
    }
    if let Some(mechanism) = request.mechanism.as_deref().filter(|s| !s.is_empty()) {
        description.push_str(&format!(", via {}", mechanism));
    }
    if let Some(beneficiary) = request.beneficiary.as_deref().filter(|s| !s.is_empty()) {
        description.push_str(&format!(", benefiting {}", beneficiary));
    }

    description
}

// ============================================================================
// Facade
// ============================================================================

pub struct QueryGenerationService {
    cache: Arc<QueryCache>,
    keyword: Box<dyn QueryStrategy>,
    prompt: Box<dyn QueryStrategy>,
    config: GenerationConfig,
    repository: QueryRecordRepository,
    model: String,
}

impl QueryGenerationService {
    pub fn new(config: &Config, cache: Arc<QueryCache>, pool: SqlitePool) -> Self {
        let client = Arc::new(ChatCompletionClient::new(config.lm.clone()));
        Self::with_strategies(
            cache,
            Box::new(KeywordQueryStrategy::new(client.clone(), config.generation.clone())),
            Box::new(PromptQueryStrategy::new(client.clone(), config.generation.clone())),
            config.generation.clone(),
            QueryRecordRepository::new(pool),
            client.model().to_string(),
        )
    }

    /// Inject strategies directly (used by tests).
    pub fn with_strategies(
        cache: Arc<QueryCache>,
        keyword: Box<dyn QueryStrategy>,
        prompt: Box<dyn QueryStrategy>,
        config: GenerationConfig,
        repository: QueryRecordRepository,
        model: String,
    ) -> Self {
        Self { cache, keyword, prompt, config, repository, model }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn cache_stats(&self) -> crate::services::query_cache::CacheStats {
        self.cache.stats()
    }

    /// Generate queries for one engine.
    ///
    /// Cache hits skip the model entirely. Model failures degrade to
    /// the configured fallback list; only request validation fails the
    /// call.
    pub async fn generate(
        &self,
        request: &QueryRequest,
    ) -> Result<GeneratedQueries, GenerationError> {
        request
            .validate()
            .map_err(|e| GenerationError::InvalidRequest(e.to_string()))?;

        let key = QueryCacheKey::from_request(request);
        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!("Query cache hit for {}", request.engine);
            return Ok(cached);
        }

        let strategy = match request.engine.query_kind() {
            QueryKind::Keyword => self.keyword.as_ref(),
            QueryKind::Prompt => self.prompt.as_ref(),
        };

        let queries = match strategy.generate(request).await {
            Ok(queries) if !queries.is_empty() => queries,
            Ok(_) => {
                tracing::warn!("{} strategy produced no queries, using fallback", request.engine);
                self.fallback_for(request.engine)
            },
            Err(e) => {
                tracing::warn!("Query generation failed for {} ({}), using fallback", request.engine, e);
                self.fallback_for(request.engine)
            },
        };

        let queries: Vec<String> = queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(request.count as usize)
            .collect();

        let generated = GeneratedQueries {
            engine: request.engine,
            queries,
            generated_at: Utc::now(),
            from_cache: false,
        };

        self.cache.put(key.clone(), generated.clone());
        self.repository.record(&request.session_id, &generated, &key);

        Ok(generated)
    }

    /// Generate for several engines concurrently. One engine's failure
    /// never fails the batch.
    pub async fn generate_for_many(
        &self,
        engines: &[SearchEngine],
        base: &QueryRequest,
    ) -> Vec<(SearchEngine, Result<GeneratedQueries, GenerationError>)> {
        let tasks = engines.iter().map(|&engine| {
            let mut request = base.clone();
            request.engine = engine;
            async move { (engine, self.generate(&request).await) }
        });

        join_all(tasks).await
    }

    fn fallback_for(&self, engine: SearchEngine) -> Vec<String> {
        match engine.query_kind() {
            QueryKind::Keyword => self.config.fallback_keyword_queries.clone(),
            QueryKind::Prompt => self.config.fallback_prompt_queries.clone(),
        }
    }
}
