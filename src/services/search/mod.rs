//! Search Adapter Set
//!
//! One adapter per engine behind a unified contract. Every adapter is
//! wrapped with retry (transient failures only) and a per-adapter
//! circuit breaker, and records an API-usage row per network attempt.

mod brave;
mod circuit_breaker;
mod perplexica;
mod retry;
mod searxng;
mod serper;
mod tavily;
mod usage;

pub use brave::BraveAdapter;
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use perplexica::PerplexicaAdapter;
pub use retry::retry_with_backoff;
pub use searxng::SearxngAdapter;
pub use serper::SerperAdapter;
pub use tavily::TavilyAdapter;
pub use usage::ApiUsageRecorder;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::models::{SearchEngine, SearchResult};

/// Adapter failure taxonomy surfaced to callers and recorded into the
/// session's per-engine failure map.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("circuit open")]
    CircuitOpen,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl AdapterError {
    /// Short name used in session failure maps and usage rows.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "RateLimited",
            Self::Timeout(_) => "Timeout",
            Self::AuthFailed(_) => "AuthFailed",
            Self::NetworkError(_) => "NetworkError",
            Self::InvalidResponse(_) => "InvalidResponse",
            Self::CircuitOpen => "CircuitOpen",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Transient failures (network, 5xx, timeout) are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::Timeout(_))
    }

    pub fn from_reqwest(e: reqwest::Error, timeout_secs: u64) -> Self {
        if e.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if e.is_connect() {
            Self::NetworkError(format!("connect: {}", e))
        } else {
            Self::NetworkError(e.to_string())
        }
    }

    /// Map a non-success HTTP status to the taxonomy.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => Self::AuthFailed(format!("{}: {}", status, body)),
            429 => Self::RateLimited(body),
            s if s >= 500 => Self::NetworkError(format!("{}: {}", status, body)),
            _ => Self::Unknown(format!("{}: {}", status, body)),
        }
    }
}

/// Resolve a vendor response into the taxonomy before the body is
/// parsed. On a non-success status the body text feeds the error.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::from_status(status, body))
}

/// Unified engine contract. Implementations map their vendor's JSON to
/// the common [`SearchResult`] shape and nothing more; resilience is
/// layered on by [`ResilientAdapter`].
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    fn engine(&self) -> SearchEngine;

    fn enabled(&self) -> bool;

    async fn search(&self, query: &str, max_results: u32)
    -> Result<Vec<SearchResult>, AdapterError>;

    /// Cheap reachability probe; never consumes API quota when the
    /// vendor bills per search.
    async fn health(&self) -> bool;
}

// ============================================================================
// Resilience wrapper
// ============================================================================

/// Decorates a raw adapter with retry, a circuit breaker, and usage
/// accounting. All tasks share one wrapper (and thus one breaker) per
/// engine.
pub struct ResilientAdapter {
    inner: Box<dyn SearchAdapter>,
    breaker: CircuitBreaker,
    usage: ApiUsageRecorder,
    timeout: Duration,
}

impl ResilientAdapter {
    pub fn new(
        inner: Box<dyn SearchAdapter>,
        breaker: CircuitBreaker,
        usage: ApiUsageRecorder,
        timeout: Duration,
    ) -> Self {
        Self { inner, breaker, usage, timeout }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }
}

#[async_trait]
impl SearchAdapter for ResilientAdapter {
    fn engine(&self) -> SearchEngine {
        self.inner.engine()
    }

    fn enabled(&self) -> bool {
        self.inner.enabled()
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        if !self.breaker.try_acquire() {
            tracing::debug!("{} breaker open, rejecting '{}'", self.engine(), query);
            return Err(AdapterError::CircuitOpen);
        }

        let start = std::time::Instant::now();
        let result = retry_with_backoff(self.timeout, || self.inner.search(query, max_results)).await;
        let elapsed_ms = start.elapsed().as_millis() as i64;

        match &result {
            Ok(results) => {
                self.breaker.on_success();
                self.usage
                    .record(self.engine(), query, results.len() as i64, true, None, elapsed_ms);
            },
            Err(e) => {
                self.breaker.on_failure();
                tracing::warn!("{} search failed ({}): {}", self.engine(), e.kind(), e);
                self.usage
                    .record(self.engine(), query, 0, false, Some(e.kind()), elapsed_ms);
            },
        }

        result
    }

    async fn health(&self) -> bool {
        self.inner.health().await
    }
}

// ============================================================================
// Adapter set
// ============================================================================

/// All configured adapters, indexed by engine.
pub struct AdapterSet {
    adapters: HashMap<SearchEngine, Arc<dyn SearchAdapter>>,
}

impl AdapterSet {
    pub fn new(adapters: HashMap<SearchEngine, Arc<dyn SearchAdapter>>) -> Self {
        Self { adapters }
    }

    /// Build the full adapter set from configuration. Disabled engines
    /// get no entry at all.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create search HTTP client");

        let mut adapters: HashMap<SearchEngine, Arc<dyn SearchAdapter>> = HashMap::new();

        let raw_adapters: Vec<(Box<dyn SearchAdapter>, u64)> = vec![
            (
                Box::new(BraveAdapter::new(config.engines.brave.clone(), client.clone()))
                    as Box<dyn SearchAdapter>,
                config.engines.brave.timeout_secs,
            ),
            (
                Box::new(SerperAdapter::new(config.engines.serper.clone(), client.clone())),
                config.engines.serper.timeout_secs,
            ),
            (
                Box::new(SearxngAdapter::new(config.engines.searxng.clone(), client.clone())),
                config.engines.searxng.timeout_secs,
            ),
            (
                Box::new(TavilyAdapter::new(config.engines.tavily.clone(), client.clone())),
                config.engines.tavily.timeout_secs,
            ),
            (
                Box::new(PerplexicaAdapter::new(config.engines.perplexica.clone(), client)),
                config.engines.perplexica.timeout_secs,
            ),
        ];

        for (adapter, timeout_secs) in raw_adapters {
            if !adapter.enabled() {
                tracing::info!("Search engine {} disabled by configuration", adapter.engine());
                continue;
            }
            let engine = adapter.engine();
            let wrapped = ResilientAdapter::new(
                adapter,
                CircuitBreaker::new(&config.breaker),
                ApiUsageRecorder::new(pool.clone()),
                Duration::from_secs(timeout_secs),
            );
            adapters.insert(engine, Arc::new(wrapped));
        }

        tracing::info!(
            "Adapter set ready: {}",
            adapters
                .keys()
                .map(|e| e.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self { adapters }
    }

    pub fn get(&self, engine: SearchEngine) -> Option<Arc<dyn SearchAdapter>> {
        self.adapters.get(&engine).cloned()
    }

    pub fn enabled_engines(&self) -> Vec<SearchEngine> {
        let mut engines: Vec<SearchEngine> = self.adapters.keys().copied().collect();
        engines.sort();
        engines
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::db;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted adapter: returns a fixed result list or a fixed error,
    /// counting how often the network would have been hit.
    struct ScriptedAdapter {
        engine: SearchEngine,
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl SearchAdapter for ScriptedAdapter {
        fn engine(&self) -> SearchEngine {
            self.engine
        }

        fn enabled(&self) -> bool {
            true
        }

        async fn search(
            &self,
            query: &str,
            _max_results: u32,
        ) -> Result<Vec<SearchResult>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AdapterError::AuthFailed("scripted".to_string()));
            }
            Ok(vec![SearchResult {
                url: "https://example.org/grants".to_string(),
                title: "Grants".to_string(),
                snippet: "grants".to_string(),
                engine: self.engine,
                query: query.to_string(),
                position: 1,
                fetched_at: Utc::now(),
            }])
        }

        async fn health(&self) -> bool {
            true
        }
    }

    async fn resilient(fail: bool) -> (ResilientAdapter, Arc<AtomicU32>, SqlitePool) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        db::init_schema(&pool).await.unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let adapter = ResilientAdapter::new(
            Box::new(ScriptedAdapter { engine: SearchEngine::Serper, calls: calls.clone(), fail }),
            CircuitBreaker::new(&BreakerConfig { failure_ratio: 0.5, window_size: 2, cooldown_secs: 60 }),
            ApiUsageRecorder::new(pool.clone()),
            Duration::from_secs(5),
        );
        (adapter, calls, pool)
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_without_network_calls() {
        let (adapter, calls, _pool) = resilient(true).await;

        // Two auth failures fill the window and trip the breaker.
        assert!(adapter.search("q1", 5).await.is_err());
        assert!(adapter.search("q2", 5).await.is_err());
        assert_eq!(adapter.breaker_state(), BreakerState::Open);
        let network_calls = calls.load(Ordering::SeqCst);

        let err = adapter.search("q3", 5).await.unwrap_err();
        assert!(matches!(err, AdapterError::CircuitOpen));
        assert_eq!(calls.load(Ordering::SeqCst), network_calls);
    }

    #[tokio::test]
    async fn successful_searches_record_usage() {
        let (adapter, _calls, pool) = resilient(false).await;

        let results = adapter.search("bulgaria grants", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(adapter.breaker_state(), BreakerState::Closed);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let (count, success): (i64, bool) =
            sqlx::query_as("SELECT result_count, success FROM api_usage LIMIT 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
        assert!(success);
    }
}
