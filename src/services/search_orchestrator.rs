//! Search Orchestrator
//!
//! Fans a batch of engine-tagged queries out across the adapter set in
//! parallel, collects whatever arrives before the batch deadline, then
//! runs the anti-spam filter, per-batch domain dedup, and the
//! blacklist gate. The batch as a whole fails only when every engine
//! failed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};

use crate::models::{SearchEngine, SearchResult};
use crate::services::domain_registry::{DomainRegistry, normalize_domain};
use crate::services::search::{AdapterError, AdapterSet};
use crate::services::spam_filter::SpamFilter;

/// One query, already tagged with the engines it targets.
#[derive(Debug, Clone)]
pub struct EngineQuery {
    pub text: String,
    pub engines: Vec<SearchEngine>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineBatchStats {
    pub raw_count: i64,
    pub spam_filtered: i64,
    pub duplicates_removed: i64,
}

#[derive(Debug)]
pub struct EngineFailure {
    pub engine: SearchEngine,
    pub kind: &'static str,
    pub message: String,
}

/// Everything one fan-out produced.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<SearchResult>,
    pub engine_stats: HashMap<SearchEngine, EngineBatchStats>,
    pub errors: Vec<EngineFailure>,
    pub successful_engines: HashSet<SearchEngine>,
    pub blacklisted_filtered: i64,
}

impl BatchOutcome {
    /// True when at least one call was attempted and none succeeded.
    pub fn is_total_failure(&self) -> bool {
        self.successful_engines.is_empty() && !self.errors.is_empty()
    }
}

pub struct SearchOrchestrator {
    adapters: Arc<AdapterSet>,
    spam_filter: Arc<SpamFilter>,
    registry: Arc<DomainRegistry>,
    batch_deadline: Duration,
}

impl SearchOrchestrator {
    pub fn new(
        adapters: Arc<AdapterSet>,
        spam_filter: Arc<SpamFilter>,
        registry: Arc<DomainRegistry>,
        batch_deadline: Duration,
    ) -> Self {
        Self { adapters, spam_filter, registry, batch_deadline }
    }

    pub async fn execute_batch(
        &self,
        queries: &[EngineQuery],
        max_results: u32,
        session_id: &str,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        // 1+2. Fan out (query x engine) and collect until the deadline.
        let mut tasks: JoinSet<(SearchEngine, Result<Vec<SearchResult>, AdapterError>)> =
            JoinSet::new();

        for query in queries {
            for &engine in &query.engines {
                let Some(adapter) = self.adapters.get(engine) else {
                    outcome.errors.push(EngineFailure {
                        engine,
                        kind: "Unknown",
                        message: format!("engine {} is not configured", engine),
                    });
                    continue;
                };
                let text = query.text.clone();
                tasks.spawn(async move { (engine, adapter.search(&text, max_results).await) });
            }
        }

        let deadline = Instant::now() + self.batch_deadline;
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Err(_) => {
                    // Deadline: cancel whatever is still in flight.
                    let outstanding = tasks.len();
                    tasks.abort_all();
                    if outstanding > 0 {
                        tracing::warn!(
                            "Batch deadline reached with {} adapter calls outstanding (session {})",
                            outstanding,
                            session_id
                        );
                    }
                    break;
                },
                Ok(None) => break,
                Ok(Some(Err(join_err))) => {
                    tracing::error!("Adapter task panicked: {}", join_err);
                },
                Ok(Some(Ok((engine, Ok(results))))) => {
                    outcome.successful_engines.insert(engine);
                    outcome.engine_stats.entry(engine).or_default().raw_count +=
                        results.len() as i64;
                    outcome.results.extend(results);
                },
                Ok(Some(Ok((engine, Err(e))))) => {
                    outcome.engine_stats.entry(engine).or_default();
                    outcome.errors.push(EngineFailure {
                        engine,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                },
            }
        }

        // 4. Anti-spam filter.
        let spam_filter = &self.spam_filter;
        let mut surviving = Vec::with_capacity(outcome.results.len());
        for result in std::mem::take(&mut outcome.results) {
            if spam_filter.check(&result).is_accepted() {
                surviving.push(result);
            } else {
                outcome
                    .engine_stats
                    .entry(result.engine)
                    .or_default()
                    .spam_filtered += 1;
            }
        }

        // 5. Domain-level dedup: best (lowest) rank wins per domain,
        // lexicographic URL breaks ties.
        let mut best_per_domain: HashMap<String, SearchResult> = HashMap::new();
        for result in surviving {
            let key = normalize_domain(&result.url).unwrap_or_else(|_| result.url.clone());
            match best_per_domain.entry(key) {
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(result);
                },
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    let kept = slot.get();
                    let replace = result.position < kept.position
                        || (result.position == kept.position && result.url < kept.url);
                    let loser = if replace { slot.insert(result) } else { result };
                    outcome
                        .engine_stats
                        .entry(loser.engine)
                        .or_default()
                        .duplicates_removed += 1;
                },
            }
        }

        // 6. Blacklist gate, one registry lookup per unique domain.
        let mut kept = Vec::with_capacity(best_per_domain.len());
        for (domain, result) in best_per_domain {
            match self.registry.is_blacklisted(&domain).await {
                Ok(true) => {
                    outcome.blacklisted_filtered += 1;
                    tracing::debug!("Dropping blacklisted domain {} (session {})", domain, session_id);
                },
                Ok(false) => kept.push(result),
                Err(e) => {
                    // Storage trouble: skip this URL for the session.
                    tracing::warn!("Blacklist lookup failed for {}: {}", domain, e);
                },
            }
        }
        outcome.results = kept;

        tracing::info!(
            "Batch done (session {}): {} results, {} engines ok, {} errors",
            session_id,
            outcome.results.len(),
            outcome.successful_engines.len(),
            outcome.errors.len()
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpamFilterConfig;
    use crate::db;
    use crate::services::search::SearchAdapter;
    use async_trait::async_trait;
    use chrono::Utc;
    use sqlx::SqlitePool;

    struct StaticAdapter {
        engine: SearchEngine,
        results: Vec<SearchResult>,
        error_kind: Option<&'static str>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl SearchAdapter for StaticAdapter {
        fn engine(&self) -> SearchEngine {
            self.engine
        }

        fn enabled(&self) -> bool {
            true
        }

        async fn search(
            &self,
            _query: &str,
            _max_results: u32,
        ) -> Result<Vec<SearchResult>, AdapterError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.error_kind {
                Some("CircuitOpen") => Err(AdapterError::CircuitOpen),
                Some(kind) => Err(AdapterError::Unknown(kind.to_string())),
                None => Ok(self.results.clone()),
            }
        }

        async fn health(&self) -> bool {
            true
        }
    }

    fn result(engine: SearchEngine, url: &str, position: u32) -> SearchResult {
        SearchResult {
            url: url.to_string(),
            title: "Bulgaria Education Grant - Foundation".to_string(),
            snippet: "grants for bulgarian students".to_string(),
            engine,
            query: "bulgaria education grants".to_string(),
            position,
            fetched_at: Utc::now(),
        }
    }

    async fn orchestrator(
        adapters: Vec<Box<dyn SearchAdapter>>,
        deadline: Duration,
    ) -> (SearchOrchestrator, Arc<DomainRegistry>) {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::init_schema(&pool).await.unwrap();
        let registry = Arc::new(DomainRegistry::new(pool));

        let map: HashMap<SearchEngine, Arc<dyn SearchAdapter>> = adapters
            .into_iter()
            .map(|a| (a.engine(), Arc::from(a)))
            .collect();

        let orchestrator = SearchOrchestrator::new(
            Arc::new(AdapterSet::new(map)),
            Arc::new(SpamFilter::new(SpamFilterConfig::default())),
            registry.clone(),
            deadline,
        );
        (orchestrator, registry)
    }

    fn query(text: &str, engines: &[SearchEngine]) -> EngineQuery {
        EngineQuery { text: text.to_string(), engines: engines.to_vec() }
    }

    #[tokio::test]
    async fn partial_failure_keeps_surviving_engine_results() {
        let (orchestrator, _) = orchestrator(
            vec![
                Box::new(StaticAdapter {
                    engine: SearchEngine::Searxng,
                    results: vec![
                        result(SearchEngine::Searxng, "https://a.org/grant", 1),
                        result(SearchEngine::Searxng, "https://b.org/grant", 2),
                        result(SearchEngine::Searxng, "https://c.org/grant", 3),
                    ],
                    error_kind: None,
                    delay: None,
                }),
                Box::new(StaticAdapter {
                    engine: SearchEngine::Serper,
                    results: vec![],
                    error_kind: Some("CircuitOpen"),
                    delay: None,
                }),
            ],
            Duration::from_secs(10),
        )
        .await;

        let queries = [
            query("q one", &[SearchEngine::Searxng, SearchEngine::Serper]),
            query("q two", &[SearchEngine::Searxng, SearchEngine::Serper]),
        ];
        let outcome = orchestrator.execute_batch(&queries, 5, "s1").await;

        assert!(!outcome.is_total_failure());
        assert!(outcome.successful_engines.contains(&SearchEngine::Searxng));
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors.iter().all(|e| e.kind == "CircuitOpen"));
        // 3 domains from 6 raw results (each query returns the same 3).
        assert_eq!(outcome.results.len(), 3);
        let searxng = &outcome.engine_stats[&SearchEngine::Searxng];
        assert_eq!(searxng.raw_count, 6);
        assert_eq!(searxng.duplicates_removed, 3);
    }

    #[tokio::test]
    async fn total_failure_is_reported() {
        let (orchestrator, _) = orchestrator(
            vec![Box::new(StaticAdapter {
                engine: SearchEngine::Searxng,
                results: vec![],
                error_kind: Some("NetworkError"),
                delay: None,
            })],
            Duration::from_secs(10),
        )
        .await;

        let outcome = orchestrator
            .execute_batch(&[query("q", &[SearchEngine::Searxng])], 5, "s1")
            .await;
        assert!(outcome.is_total_failure());
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn dedup_keeps_best_rank_with_url_tiebreak() {
        let (orchestrator, _) = orchestrator(
            vec![Box::new(StaticAdapter {
                engine: SearchEngine::Searxng,
                results: vec![
                    result(SearchEngine::Searxng, "https://same.org/deep/page", 3),
                    result(SearchEngine::Searxng, "https://same.org/top", 1),
                    result(SearchEngine::Searxng, "https://www.same.org/alpha", 1),
                ],
                error_kind: None,
                delay: None,
            })],
            Duration::from_secs(10),
        )
        .await;

        let outcome = orchestrator
            .execute_batch(&[query("q", &[SearchEngine::Searxng])], 5, "s1")
            .await;

        assert_eq!(outcome.results.len(), 1);
        // Position 1 twice: lexicographically smaller URL wins.
        assert_eq!(outcome.results[0].url, "https://same.org/top");
        assert_eq!(
            outcome.engine_stats[&SearchEngine::Searxng].duplicates_removed,
            2
        );
    }

    #[tokio::test]
    async fn spam_results_are_filtered_and_counted() {
        let mut spam = result(SearchEngine::Searxng, "https://ok.org/a", 1);
        spam.title = "Bulgaria Grants!!! Click Now".to_string();

        let (orchestrator, _) = orchestrator(
            vec![Box::new(StaticAdapter {
                engine: SearchEngine::Searxng,
                results: vec![spam, result(SearchEngine::Searxng, "https://fine.org/b", 2)],
                error_kind: None,
                delay: None,
            })],
            Duration::from_secs(10),
        )
        .await;

        let outcome = orchestrator
            .execute_batch(&[query("q", &[SearchEngine::Searxng])], 5, "s1")
            .await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].url, "https://fine.org/b");
        assert_eq!(outcome.engine_stats[&SearchEngine::Searxng].spam_filtered, 1);
    }

    #[tokio::test]
    async fn blacklisted_domains_never_leave_the_orchestrator() {
        let (orchestrator, registry) = orchestrator(
            vec![Box::new(StaticAdapter {
                engine: SearchEngine::Searxng,
                results: vec![
                    result(SearchEngine::Searxng, "https://badsite.com/funding", 1),
                    result(SearchEngine::Searxng, "https://goodsite.org/funding", 2),
                ],
                error_kind: None,
                delay: None,
            })],
            Duration::from_secs(10),
        )
        .await;

        registry.blacklist("badsite.com", "op", "spam farm").await.unwrap();

        let outcome = orchestrator
            .execute_batch(&[query("q", &[SearchEngine::Searxng])], 5, "s1")
            .await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].url, "https://goodsite.org/funding");
        assert_eq!(outcome.blacklisted_filtered, 1);
    }

    #[tokio::test]
    async fn deadline_cancels_outstanding_calls_but_keeps_finished_ones() {
        let (orchestrator, _) = orchestrator(
            vec![
                Box::new(StaticAdapter {
                    engine: SearchEngine::Searxng,
                    results: vec![result(SearchEngine::Searxng, "https://quick.org/a", 1)],
                    error_kind: None,
                    delay: None,
                }),
                Box::new(StaticAdapter {
                    engine: SearchEngine::Tavily,
                    results: vec![result(SearchEngine::Tavily, "https://slow.org/a", 1)],
                    error_kind: None,
                    delay: Some(Duration::from_secs(60)),
                }),
            ],
            Duration::from_secs(1),
        )
        .await;

        let outcome = orchestrator
            .execute_batch(
                &[query("q", &[SearchEngine::Searxng, SearchEngine::Tavily])],
                5,
                "s1",
            )
            .await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].url, "https://quick.org/a");
        assert!(outcome.successful_engines.contains(&SearchEngine::Searxng));
        assert!(!outcome.successful_engines.contains(&SearchEngine::Tavily));
    }
}
