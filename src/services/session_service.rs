//! Session Service
//!
//! Owns the DiscoverySession lifecycle and its statistics write-back.
//! Counters merge by addition so concurrent batches cannot lose each
//! other's work; the average confidence is recomputed from the
//! candidate rows rather than merged.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{DiscoverySession, DiscoveryStatus, SearchEngine, SessionType};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Mergeable per-batch statistics; all counters are additive.
#[derive(Debug, Clone, Default)]
pub struct SessionBatchStats {
    pub candidates_created: i64,
    pub duplicates_detected: i64,
    pub engine_result_counts: HashMap<String, i64>,
}

pub struct SessionService {
    pool: SqlitePool,
}

impl SessionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a session in RUNNING with its engine set and query list.
    pub async fn begin(
        &self,
        session_type: SessionType,
        engines: &[SearchEngine],
        queries: &[String],
        language_model: Option<&str>,
    ) -> Result<DiscoverySession, SessionError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let engine_names: Vec<&str> = engines.iter().map(|e| e.as_str()).collect();

        sqlx::query(
            r#"INSERT INTO discovery_sessions
                 (id, session_type, status, executed_at, started_at,
                  search_engines_used, search_queries, language_model)
               VALUES (?, ?, 'RUNNING', ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(session_type.as_str())
        .bind(now)
        .bind(now)
        .bind(serde_json::to_string(&engine_names)?)
        .bind(serde_json::to_string(queries)?)
        .bind(language_model)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Discovery session {} started ({}, engines: {})",
            id,
            session_type.as_str(),
            engine_names.join(", ")
        );
        self.require(&id).await
    }

    /// Replace the session's query list once generation has run.
    pub async fn set_queries(
        &self,
        session_id: &str,
        queries: &[String],
    ) -> Result<(), SessionError> {
        let result = sqlx::query("UPDATE discovery_sessions SET search_queries = ? WHERE id = ?")
            .bind(serde_json::to_string(queries)?)
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// Append one error description to the per-engine failure map.
    pub async fn record_engine_error(
        &self,
        session_id: &str,
        engine: SearchEngine,
        error: &str,
    ) -> Result<(), SessionError> {
        let session = self.require(session_id).await?;
        let mut failures = session.failures();
        failures
            .entry(engine.as_str().to_string())
            .or_default()
            .push(error.to_string());

        sqlx::query("UPDATE discovery_sessions SET engine_failures = ? WHERE id = ?")
            .bind(serde_json::to_string(&failures)?)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Merge one batch's counters into the session.
    pub async fn record_batch_stats(
        &self,
        session_id: &str,
        stats: &SessionBatchStats,
    ) -> Result<(), SessionError> {
        let session = self.require(session_id).await?;

        let mut counts = session.result_counts();
        for (engine, count) in &stats.engine_result_counts {
            *counts.entry(engine.clone()).or_insert(0) += count;
        }

        sqlx::query(
            r#"UPDATE discovery_sessions SET
                 candidates_found = candidates_found + ?,
                 duplicates_detected = duplicates_detected + ?,
                 engine_result_counts = ?,
                 average_confidence_score =
                     (SELECT AVG(confidence_score) FROM funding_candidates WHERE session_id = ?)
               WHERE id = ?"#,
        )
        .bind(stats.candidates_created)
        .bind(stats.duplicates_detected)
        .bind(serde_json::to_string(&counts)?)
        .bind(session_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// RUNNING -> COMPLETED, stamping completion time and duration.
    /// A session already cancelled (or otherwise terminal) is left as
    /// it is.
    pub async fn complete(&self, session_id: &str) -> Result<DiscoverySession, SessionError> {
        let session = self.require(session_id).await?;
        let now = Utc::now();
        let duration_minutes = (now - session.started_at).num_minutes();

        let result = sqlx::query(
            r#"UPDATE discovery_sessions SET
                 status = 'COMPLETED', completed_at = ?, duration_minutes = ?,
                 average_confidence_score =
                     (SELECT AVG(confidence_score) FROM funding_candidates WHERE session_id = ?)
               WHERE id = ? AND status = 'RUNNING'"#,
        )
        .bind(now)
        .bind(duration_minutes)
        .bind(session_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!("Session {} already terminal, not completing", session_id);
        } else {
            tracing::info!("Discovery session {} completed in {} min", session_id, duration_minutes);
        }
        self.require(session_id).await
    }

    /// RUNNING -> FAILED, recording the error list.
    pub async fn fail(
        &self,
        session_id: &str,
        errors: &[String],
    ) -> Result<DiscoverySession, SessionError> {
        let session = self.require(session_id).await?;
        let now = Utc::now();
        let duration_minutes = (now - session.started_at).num_minutes();

        let mut failures = session.failures();
        if !errors.is_empty() {
            failures
                .entry("SESSION".to_string())
                .or_default()
                .extend(errors.iter().cloned());
        }

        let result = sqlx::query(
            r#"UPDATE discovery_sessions SET
                 status = 'FAILED', completed_at = ?, duration_minutes = ?, engine_failures = ?
               WHERE id = ? AND status = 'RUNNING'"#,
        )
        .bind(now)
        .bind(duration_minutes)
        .bind(serde_json::to_string(&failures)?)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::warn!("Discovery session {} failed: {:?}", session_id, errors);
        }
        self.require(session_id).await
    }

    /// RUNNING -> CANCELLED; any other state is an error.
    pub async fn cancel(&self, session_id: &str) -> Result<DiscoverySession, SessionError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"UPDATE discovery_sessions SET
                 status = 'CANCELLED', completed_at = ?,
                 duration_minutes = CAST((julianday(?) - julianday(started_at)) * 1440 AS INTEGER)
               WHERE id = ? AND status = 'RUNNING'"#,
        )
        .bind(now)
        .bind(now)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Either unknown or not cancellable from its current state.
            return match self.get(session_id).await? {
                None => Err(SessionError::NotFound(session_id.to_string())),
                Some(s) => Err(SessionError::InvalidState(format!(
                    "session {} is {}, only RUNNING sessions can be cancelled",
                    session_id, s.status
                ))),
            };
        }

        tracing::info!("Discovery session {} cancelled", session_id);
        self.require(session_id).await
    }

    pub async fn is_cancelled(&self, session_id: &str) -> Result<bool, SessionError> {
        Ok(self
            .get(session_id)
            .await?
            .map(|s| s.status_enum() == DiscoveryStatus::Cancelled)
            .unwrap_or(false))
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<DiscoverySession>, SessionError> {
        sqlx::query_as::<_, DiscoverySession>("SELECT * FROM discovery_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(SessionError::from)
    }

    /// Paged listing, newest first, RUNNING sessions included.
    pub async fn list(
        &self,
        page: i64,
        size: i64,
    ) -> Result<(Vec<DiscoverySession>, i64), SessionError> {
        let sessions = sqlx::query_as::<_, DiscoverySession>(
            "SELECT * FROM discovery_sessions ORDER BY started_at DESC LIMIT ? OFFSET ?",
        )
        .bind(size)
        .bind(page * size)
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM discovery_sessions")
            .fetch_one(&self.pool)
            .await?;

        Ok((sessions, total))
    }

    async fn require(&self, session_id: &str) -> Result<DiscoverySession, SessionError> {
        self.get(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn setup() -> SessionService {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        db::init_schema(&pool).await.unwrap();
        SessionService::new(pool)
    }

    fn queries() -> Vec<String> {
        vec!["bulgaria education grants".to_string()]
    }

    #[tokio::test]
    async fn begin_opens_a_running_session() {
        let service = setup().await;
        let session = service
            .begin(
                SessionType::Manual,
                &[SearchEngine::Searxng, SearchEngine::Serper],
                &queries(),
                Some("test-model"),
            )
            .await
            .unwrap();

        assert_eq!(session.status_enum(), DiscoveryStatus::Running);
        assert_eq!(session.type_enum(), SessionType::Manual);
        assert_eq!(session.engines(), vec![SearchEngine::Searxng, SearchEngine::Serper]);
        assert_eq!(session.queries(), queries());
        assert!(session.completed_at.is_none());
        assert_eq!(session.candidates_found, 0);
    }

    #[tokio::test]
    async fn engine_errors_accumulate_per_engine() {
        let service = setup().await;
        let session = service
            .begin(SessionType::Manual, &[SearchEngine::Serper], &queries(), None)
            .await
            .unwrap();

        service
            .record_engine_error(&session.id, SearchEngine::Serper, "CircuitOpen")
            .await
            .unwrap();
        service
            .record_engine_error(&session.id, SearchEngine::Serper, "CircuitOpen")
            .await
            .unwrap();

        let session = service.get(&session.id).await.unwrap().unwrap();
        assert_eq!(
            session.failures().get("SERPER"),
            Some(&vec!["CircuitOpen".to_string(), "CircuitOpen".to_string()])
        );
    }

    #[tokio::test]
    async fn batch_stats_merge_additively() {
        let service = setup().await;
        let session = service
            .begin(SessionType::Manual, &[SearchEngine::Searxng], &queries(), None)
            .await
            .unwrap();

        let mut first = SessionBatchStats {
            candidates_created: 2,
            duplicates_detected: 1,
            ..Default::default()
        };
        first.engine_result_counts.insert("SEARXNG".to_string(), 5);
        service.record_batch_stats(&session.id, &first).await.unwrap();

        let mut second = SessionBatchStats {
            candidates_created: 1,
            duplicates_detected: 0,
            ..Default::default()
        };
        second.engine_result_counts.insert("SEARXNG".to_string(), 3);
        service.record_batch_stats(&session.id, &second).await.unwrap();

        let session = service.get(&session.id).await.unwrap().unwrap();
        assert_eq!(session.candidates_found, 3);
        assert_eq!(session.duplicates_detected, 1);
        assert_eq!(session.result_counts().get("SEARXNG"), Some(&8));
    }

    #[tokio::test]
    async fn complete_stamps_time_and_duration() {
        let service = setup().await;
        let session = service
            .begin(SessionType::Scheduled, &[SearchEngine::Searxng], &queries(), None)
            .await
            .unwrap();

        let completed = service.complete(&session.id).await.unwrap();
        assert_eq!(completed.status_enum(), DiscoveryStatus::Completed);
        let completed_at = completed.completed_at.expect("completed_at must be set");
        assert!(completed_at >= completed.started_at);
        assert_eq!(completed.duration_minutes, Some(0));
        // No candidates: average stays null.
        assert!(completed.average_confidence_score.is_none());
    }

    #[tokio::test]
    async fn fail_records_the_error_list() {
        let service = setup().await;
        let session = service
            .begin(SessionType::Manual, &[SearchEngine::Searxng], &queries(), None)
            .await
            .unwrap();

        let failed = service
            .fail(&session.id, &["all engines failed".to_string()])
            .await
            .unwrap();
        assert_eq!(failed.status_enum(), DiscoveryStatus::Failed);
        assert!(failed.completed_at.is_some());
        assert_eq!(
            failed.failures().get("SESSION"),
            Some(&vec!["all engines failed".to_string()])
        );
    }

    #[tokio::test]
    async fn cancel_is_only_valid_from_running() {
        let service = setup().await;
        let session = service
            .begin(SessionType::Manual, &[SearchEngine::Searxng], &queries(), None)
            .await
            .unwrap();

        let cancelled = service.cancel(&session.id).await.unwrap();
        assert_eq!(cancelled.status_enum(), DiscoveryStatus::Cancelled);
        assert!(service.is_cancelled(&session.id).await.unwrap());

        let again = service.cancel(&session.id).await;
        assert!(matches!(again, Err(SessionError::InvalidState(_))));

        let missing = service.cancel("no-such-session").await;
        assert!(matches!(missing, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn finalizers_never_overwrite_a_cancelled_session() {
        let service = setup().await;
        let session = service
            .begin(SessionType::Manual, &[SearchEngine::Searxng], &queries(), None)
            .await
            .unwrap();

        service.cancel(&session.id).await.unwrap();

        // A batch finishing after the cancel must not flip the status.
        let after_complete = service.complete(&session.id).await.unwrap();
        assert_eq!(after_complete.status_enum(), DiscoveryStatus::Cancelled);

        let after_fail = service.fail(&session.id, &["late error".to_string()]).await.unwrap();
        assert_eq!(after_fail.status_enum(), DiscoveryStatus::Cancelled);
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let service = setup().await;
        for _ in 0..3 {
            service
                .begin(SessionType::Manual, &[SearchEngine::Searxng], &queries(), None)
                .await
                .unwrap();
        }

        let (first_page, total) = service.list(0, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(first_page.len(), 2);

        let (second_page, _) = service.list(1, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
    }
}
