//! Candidate Processor
//!
//! Ties registry, judge, and persistence together for one batch of
//! search results. Results are processed concurrently under a bound;
//! one result's failure never aborts the others.

use std::time::Instant;

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{CandidateStatus, SearchResult};
use crate::services::domain_registry::DomainRegistry;
use crate::services::metadata_judge::{MetadataJudge, MetadataJudgment};
use crate::utils::decimal::{average, to_stored};

/// Aggregate outcome of one processed batch; becomes the session's
/// statistics.
#[derive(Debug, Clone, Default)]
pub struct ProcessingStats {
    pub total_processed: i64,
    pub candidates_created: i64,
    pub skipped_low_confidence: i64,
    pub skipped_domain: i64,
    pub skipped_blacklisted: i64,
    pub failures: i64,
    pub min_confidence: Option<Decimal>,
    pub avg_confidence: Option<Decimal>,
    pub max_confidence: Option<Decimal>,
    pub elapsed_ms: i64,
}

enum ResultOutcome {
    Created(Decimal),
    SkippedLowConfidence,
    SkippedDomain,
    SkippedBlacklisted,
    Failed,
}

pub struct CandidateProcessor {
    registry: Arc<DomainRegistry>,
    judge: Arc<MetadataJudge>,
    pool: SqlitePool,
    max_concurrent: usize,
}

impl CandidateProcessor {
    pub fn new(
        registry: Arc<DomainRegistry>,
        judge: Arc<MetadataJudge>,
        pool: SqlitePool,
        max_concurrent: usize,
    ) -> Self {
        Self { registry, judge, pool, max_concurrent: max_concurrent.max(1) }
    }

    pub async fn process_batch(
        &self,
        session_id: &str,
        results: Vec<SearchResult>,
    ) -> ProcessingStats {
        let started = Instant::now();
        let total = results.len() as i64;

        let outcomes: Vec<ResultOutcome> = stream::iter(results)
            .map(|result| self.process_one(session_id, result))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut stats = ProcessingStats { total_processed: total, ..Default::default() };
        let mut confidences: Vec<Decimal> = Vec::new();

        for outcome in outcomes {
            match outcome {
                ResultOutcome::Created(confidence) => {
                    stats.candidates_created += 1;
                    confidences.push(confidence);
                },
                ResultOutcome::SkippedLowConfidence => stats.skipped_low_confidence += 1,
                ResultOutcome::SkippedDomain => stats.skipped_domain += 1,
                ResultOutcome::SkippedBlacklisted => stats.skipped_blacklisted += 1,
                ResultOutcome::Failed => stats.failures += 1,
            }
        }

        stats.min_confidence = confidences.iter().min().copied();
        stats.max_confidence = confidences.iter().max().copied();
        stats.avg_confidence = average(&confidences);
        stats.elapsed_ms = started.elapsed().as_millis() as i64;

        tracing::info!(
            "Processed {} results for session {}: {} candidates, {} low-confidence, {} skipped, {} failures",
            stats.total_processed,
            session_id,
            stats.candidates_created,
            stats.skipped_low_confidence,
            stats.skipped_domain + stats.skipped_blacklisted,
            stats.failures
        );

        stats
    }

    /// The per-result pipeline. Every error is confined to this result.
    async fn process_one(&self, session_id: &str, result: SearchResult) -> ResultOutcome {
        let domain_name = match self.registry.extract_domain(&result.url) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("Skipping unprocessable url {}: {}", result.url, e);
                return ResultOutcome::Failed;
            },
        };

        match self.registry.should_process(&result.url).await {
            Ok(true) => {},
            Ok(false) => {
                return match self.registry.is_blacklisted(&domain_name).await {
                    Ok(true) => ResultOutcome::SkippedBlacklisted,
                    _ => ResultOutcome::SkippedDomain,
                };
            },
            Err(e) => {
                // Skip this session, try again next time.
                tracing::warn!("should_process failed for {}: {}", domain_name, e);
                return ResultOutcome::Failed;
            },
        }

        let domain = match self.registry.register(&result.url, session_id).await {
            Ok(domain) => domain,
            Err(e) => {
                tracing::warn!("Failed to register domain {}: {}", domain_name, e);
                return ResultOutcome::Failed;
            },
        };

        if let Err(e) = self.registry.mark_processing(&domain.id).await {
            tracing::warn!("Failed to mark {} as processing: {}", domain.name, e);
        }

        let judgment = self.judge.judge(&result);

        if judgment.should_crawl {
            if let Err(e) = self.insert_candidate(session_id, &domain.id, &result, &judgment).await
            {
                tracing::warn!("Failed to persist candidate for {}: {}", result.url, e);
                return ResultOutcome::Failed;
            }
            if let Err(e) = self
                .registry
                .update_quality(&domain.id, judgment.confidence, true)
                .await
            {
                tracing::warn!("Quality update failed for {}: {}", domain.name, e);
            }
            ResultOutcome::Created(judgment.confidence)
        } else {
            if let Err(e) = self
                .registry
                .update_quality(&domain.id, judgment.confidence, false)
                .await
            {
                tracing::warn!("Quality update failed for {}: {}", domain.name, e);
            }
            ResultOutcome::SkippedLowConfidence
        }
    }

    async fn insert_candidate(
        &self,
        session_id: &str,
        domain_id: &str,
        result: &SearchResult,
        judgment: &MetadataJudgment,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO funding_candidates
                 (id, session_id, domain_id, status, confidence_score, source_url,
                  discovered_at, organization_name, program_name, description,
                  judge_reasoning, source_query)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(session_id)
        .bind(domain_id)
        .bind(CandidateStatus::PendingCrawl.as_str())
        .bind(to_stored(judgment.confidence))
        .bind(&result.url)
        .bind(Utc::now())
        .bind(&judgment.organization_name)
        .bind(&judgment.program_name)
        .bind(&result.snippet)
        .bind(&judgment.reasoning)
        .bind(&result.query)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JudgeConfig;
    use crate::db;
    use crate::models::{DomainStatus, FundingCandidate, SearchEngine};

    async fn setup(max_concurrent: usize) -> (CandidateProcessor, Arc<DomainRegistry>, SqlitePool)
    {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::init_schema(&pool).await.unwrap();
        sqlx::query(
            r#"INSERT INTO discovery_sessions (id, session_type, executed_at, started_at)
               VALUES ('s1', 'test', ?, ?)"#,
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();
        let registry = Arc::new(DomainRegistry::new(pool.clone()));
        let processor = CandidateProcessor::new(
            registry.clone(),
            Arc::new(MetadataJudge::new(JudgeConfig::default())),
            pool.clone(),
            max_concurrent,
        );
        (processor, registry, pool)
    }

    fn credible_result(url: &str) -> SearchResult {
        SearchResult {
            url: url.to_string(),
            title: "Bulgaria Education Grant - US-Bulgaria Foundation".to_string(),
            snippet: "Grants and scholarships for Bulgarian students...".to_string(),
            engine: SearchEngine::Searxng,
            query: "bulgaria education grants".to_string(),
            position: 1,
            fetched_at: Utc::now(),
        }
    }

    fn weak_result(url: &str) -> SearchResult {
        SearchResult {
            url: url.to_string(),
            title: "Recipe blog".to_string(),
            snippet: "banitsa recipes".to_string(),
            engine: SearchEngine::Searxng,
            query: "bulgaria education grants".to_string(),
            position: 2,
            fetched_at: Utc::now(),
        }
    }

    async fn candidates(pool: &SqlitePool, session_id: &str) -> Vec<FundingCandidate> {
        sqlx::query_as("SELECT * FROM funding_candidates WHERE session_id = ?")
            .bind(session_id)
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn credible_result_becomes_a_pending_crawl_candidate() {
        let (processor, registry, pool) = setup(4).await;

        let stats = processor
            .process_batch("s1", vec![credible_result("https://us-bulgaria.org/ed-grant")])
            .await;

        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.candidates_created, 1);
        assert_eq!(stats.failures, 0);
        assert!(stats.avg_confidence.unwrap() >= Decimal::from_str_exact("0.60").unwrap());
        assert_eq!(stats.min_confidence, stats.max_confidence);

        let rows = candidates(&pool, "s1").await;
        assert_eq!(rows.len(), 1);
        let candidate = &rows[0];
        assert_eq!(candidate.status_enum(), CandidateStatus::PendingCrawl);
        assert!(candidate.confidence_score >= 0.60);
        assert_eq!(candidate.organization_name, "US-Bulgaria Foundation");
        assert_eq!(candidate.program_name, "Bulgaria Education Grant");
        assert_eq!(candidate.source_query, "bulgaria education grants");

        let domain = registry.get_by_name("us-bulgaria.org").await.unwrap().unwrap();
        assert_eq!(domain.status_enum(), DomainStatus::ProcessedHighQuality);
        assert_eq!(domain.high_quality_count, 1);
        assert_eq!(domain.id, candidate.domain_id);
    }

    #[tokio::test]
    async fn low_confidence_results_update_the_domain_without_a_candidate() {
        let (processor, registry, pool) = setup(4).await;

        let stats = processor
            .process_batch("s1", vec![weak_result("https://recipes.example.net/banitsa")])
            .await;

        assert_eq!(stats.candidates_created, 0);
        assert_eq!(stats.skipped_low_confidence, 1);
        assert!(stats.avg_confidence.is_none());
        assert!(candidates(&pool, "s1").await.is_empty());

        let domain = registry.get_by_name("recipes.example.net").await.unwrap().unwrap();
        assert_eq!(domain.status_enum(), DomainStatus::ProcessedLowQuality);
        assert_eq!(domain.low_quality_count, 1);
        assert!(domain.best_confidence_score.is_some());
    }

    #[tokio::test]
    async fn invalid_urls_count_as_failures() {
        let (processor, _, pool) = setup(4).await;

        let stats = processor
            .process_batch(
                "s1",
                vec![
                    credible_result("http://192.168.0.1/grants"),
                    credible_result("not a url at all"),
                ],
            )
            .await;

        assert_eq!(stats.failures, 2);
        assert_eq!(stats.candidates_created, 0);
        assert!(candidates(&pool, "s1").await.is_empty());
    }

    #[tokio::test]
    async fn blacklisted_domains_are_skipped_and_left_untouched() {
        let (processor, registry, pool) = setup(4).await;
        registry.blacklist("badsite.com", "op", "farm").await.unwrap();

        let stats = processor
            .process_batch("s1", vec![credible_result("https://badsite.com/funding")])
            .await;

        assert_eq!(stats.candidates_created, 0);
        assert_eq!(stats.skipped_blacklisted, 1);
        assert!(candidates(&pool, "s1").await.is_empty());

        let domain = registry.get_by_name("badsite.com").await.unwrap().unwrap();
        assert_eq!(domain.status_enum(), DomainStatus::Blacklisted);
        assert_eq!(domain.high_quality_count, 0);
        assert_eq!(domain.low_quality_count, 0);
    }

    #[tokio::test]
    async fn already_processed_domains_are_skipped_on_rerun() {
        let (processor, _, pool) = setup(4).await;

        let first = processor
            .process_batch("s1", vec![credible_result("https://us-bulgaria.org/ed-grant")])
            .await;
        assert_eq!(first.candidates_created, 1);

        let second = processor
            .process_batch("s1", vec![credible_result("https://us-bulgaria.org/other")])
            .await;
        assert_eq!(second.candidates_created, 0);
        assert_eq!(second.skipped_domain, 1);
        assert_eq!(candidates(&pool, "s1").await.len(), 1);
    }

    #[tokio::test]
    async fn mixed_batch_is_processed_concurrently_without_cross_aborts() {
        let (processor, _, pool) = setup(2).await;

        let stats = processor
            .process_batch(
                "s1",
                vec![
                    credible_result("https://one.org/grant"),
                    weak_result("https://two.net/blog"),
                    credible_result("bad url"),
                    credible_result("https://three.org/fund"),
                ],
            )
            .await;

        assert_eq!(stats.total_processed, 4);
        assert_eq!(stats.candidates_created, 2);
        assert_eq!(stats.skipped_low_confidence, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(candidates(&pool, "s1").await.len(), 2);
    }
}
