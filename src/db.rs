//! Database pool creation and schema bootstrap.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables used by the discovery pipeline.
///
/// JSON-valued columns (engine sets, failure maps, query lists) are
/// TEXT; serialization happens in the owning repository.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS domains (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'DISCOVERED',
            discovered_at TIMESTAMP NOT NULL,
            last_processed_at TIMESTAMP,
            high_quality_count INTEGER NOT NULL DEFAULT 0,
            low_quality_count INTEGER NOT NULL DEFAULT 0,
            best_confidence_score REAL,
            blacklisted_by TEXT,
            blacklisted_at TIMESTAMP,
            blacklist_reason TEXT,
            retry_after TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS discovery_sessions (
            id TEXT PRIMARY KEY,
            session_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'RUNNING',
            executed_at TIMESTAMP NOT NULL,
            started_at TIMESTAMP NOT NULL,
            completed_at TIMESTAMP,
            duration_minutes INTEGER,
            candidates_found INTEGER NOT NULL DEFAULT 0,
            duplicates_detected INTEGER NOT NULL DEFAULT 0,
            average_confidence_score REAL,
            search_engines_used TEXT NOT NULL DEFAULT '[]',
            search_queries TEXT NOT NULL DEFAULT '[]',
            engine_result_counts TEXT NOT NULL DEFAULT '{}',
            engine_failures TEXT NOT NULL DEFAULT '{}',
            prompt_id TEXT,
            language_model TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS funding_candidates (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES discovery_sessions(id),
            domain_id TEXT NOT NULL REFERENCES domains(id),
            status TEXT NOT NULL DEFAULT 'PENDING_CRAWL',
            confidence_score REAL NOT NULL,
            source_url TEXT NOT NULL,
            discovered_at TIMESTAMP NOT NULL,
            organization_name TEXT NOT NULL,
            program_name TEXT NOT NULL,
            description TEXT NOT NULL,
            judge_reasoning TEXT NOT NULL,
            source_query TEXT NOT NULL,
            UNIQUE(session_id, source_url)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_queries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT,
            engine TEXT NOT NULL,
            query_text TEXT NOT NULL,
            cache_key TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            engine TEXT NOT NULL,
            query TEXT NOT NULL,
            result_count INTEGER NOT NULL DEFAULT 0,
            success BOOLEAN NOT NULL,
            error_kind TEXT,
            executed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            response_time_ms INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_candidates_session ON funding_candidates(session_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sessions_started ON discovery_sessions(started_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_api_usage_engine ON api_usage(engine)")
        .execute(pool)
        .await?;

    Ok(())
}
