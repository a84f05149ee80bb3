//! Persistence of generated queries.
//!
//! One row per query string, tagged with the engine, session, and the
//! cache key that produced it. Writes are fire-and-forget; query
//! generation never waits on the database.

use sqlx::SqlitePool;

use crate::models::{GeneratedQueries, QueryCacheKey};

#[derive(Clone)]
pub struct QueryRecordRepository {
    pool: SqlitePool,
}

impl QueryRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn record(&self, session_id: &str, generated: &GeneratedQueries, key: &QueryCacheKey) {
        let pool = self.pool.clone();
        let session_id = session_id.to_string();
        let engine = generated.engine.as_str();
        let queries = generated.queries.clone();
        let cache_key = key.as_tag_string();

        tokio::spawn(async move {
            for query_text in &queries {
                let result = sqlx::query(
                    r#"INSERT INTO search_queries (session_id, engine, query_text, cache_key)
                       VALUES (?, ?, ?, ?)"#,
                )
                .bind(&session_id)
                .bind(engine)
                .bind(query_text)
                .bind(&cache_key)
                .execute(&pool)
                .await;

                if let Err(e) = result {
                    tracing::warn!("Failed to persist generated query: {}", e);
                    break;
                }
            }
        });
    }
}
