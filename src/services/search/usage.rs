//! API usage accounting.
//!
//! Every network attempt against a search vendor leaves a row for
//! later rate-limit accounting. Writes are fire-and-forget; losing a
//! row under load is acceptable, slowing a search is not.

use sqlx::SqlitePool;

use crate::models::SearchEngine;

#[derive(Clone)]
pub struct ApiUsageRecorder {
    pool: SqlitePool,
}

impl ApiUsageRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn record(
        &self,
        engine: SearchEngine,
        query: &str,
        result_count: i64,
        success: bool,
        error_kind: Option<&str>,
        response_time_ms: i64,
    ) {
        let pool = self.pool.clone();
        let query = query.to_string();
        let error_kind = error_kind.map(|s| s.to_string());

        tokio::spawn(async move {
            let result = sqlx::query(
                r#"INSERT INTO api_usage
                     (engine, query, result_count, success, error_kind, response_time_ms)
                   VALUES (?, ?, ?, ?, ?, ?)"#,
            )
            .bind(engine.as_str())
            .bind(&query)
            .bind(result_count)
            .bind(success)
            .bind(&error_kind)
            .bind(response_time_ms)
            .execute(&pool)
            .await;

            if let Err(e) = result {
                tracing::warn!("Failed to record API usage for {}: {}", engine, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn records_usage_rows() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        db::init_schema(&pool).await.unwrap();

        let recorder = ApiUsageRecorder::new(pool.clone());
        recorder.record(SearchEngine::Searxng, "bulgaria grants", 3, true, None, 120);
        recorder.record(SearchEngine::Serper, "bulgaria grants", 0, false, Some("Timeout"), 10_000);

        // The insert is spawned; give it a moment to land.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_usage")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 2);

        let (kind,): (Option<String>,) =
            sqlx::query_as("SELECT error_kind FROM api_usage WHERE engine = 'SERPER'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(kind.as_deref(), Some("Timeout"));
    }
}
