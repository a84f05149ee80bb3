//! Domain Registry
//!
//! Sole writer of the `domains` table and the sole authority on
//! whether a URL should be processed this session. Concurrent inserts
//! on the unique domain name are resolved by catching the uniqueness
//! violation and reloading the winning row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use url::{Host, Url};
use uuid::Uuid;

use crate::models::{Domain, DomainStatus};
use crate::utils::decimal::to_stored;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("domain not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Normalize a URL to its registrable host: lowercase, leading `www.`
/// stripped. IP literals and non-http(s) schemes are rejected.
pub fn normalize_domain(url: &str) -> Result<String, DomainError> {
    let parsed = Url::parse(url).map_err(|_| DomainError::InvalidUrl(url.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {},
        other => {
            return Err(DomainError::InvalidUrl(format!("unsupported scheme '{}': {}", other, url)));
        },
    }

    match parsed.host() {
        Some(Host::Domain(host)) => {
            let host = host.to_lowercase();
            let host = host.strip_prefix("www.").unwrap_or(&host);
            if host.is_empty() || !host.contains('.') {
                return Err(DomainError::InvalidUrl(format!("unregistrable host: {}", url)));
            }
            Ok(host.to_string())
        },
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => {
            Err(DomainError::InvalidUrl(format!("ip literal host: {}", url)))
        },
        None => Err(DomainError::InvalidUrl(format!("missing host: {}", url))),
    }
}

pub struct DomainRegistry {
    pool: SqlitePool,
}

impl DomainRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn extract_domain(&self, url: &str) -> Result<String, DomainError> {
        normalize_domain(url)
    }

    /// Whether the pipeline should spend any further work on this URL.
    pub async fn should_process(&self, url: &str) -> Result<bool, DomainError> {
        let name = normalize_domain(url)?;
        let Some(domain) = self.get_by_name(&name).await? else {
            return Ok(true);
        };

        let decision = match domain.status_enum() {
            DomainStatus::Discovered | DomainStatus::NoFundsThisYear => true,
            DomainStatus::ProcessingFailed => domain
                .retry_after
                .map(|t| t <= Utc::now())
                .unwrap_or(true),
            DomainStatus::Blacklisted
            | DomainStatus::Processing
            | DomainStatus::ProcessedLowQuality
            | DomainStatus::ProcessedHighQuality => false,
        };
        Ok(decision)
    }

    /// Idempotent registration: returns the existing row if the domain
    /// is already known; otherwise inserts it as DISCOVERED.
    pub async fn register(&self, url: &str, session_id: &str) -> Result<Domain, DomainError> {
        let name = normalize_domain(url)?;

        if let Some(existing) = self.get_by_name(&name).await? {
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        let insert = sqlx::query(
            r#"INSERT INTO domains (id, name, status, discovered_at, high_quality_count, low_quality_count)
               VALUES (?, ?, ?, ?, 0, 0)"#,
        )
        .bind(&id)
        .bind(&name)
        .bind(DomainStatus::Discovered.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match insert {
            Ok(_) => {
                tracing::debug!("Registered new domain {} (session {})", name, session_id);
            },
            Err(sqlx::Error::Database(db_err))
                if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                // Another session won the insert race; its row is ours too.
                tracing::debug!("Domain {} registered concurrently, reloading", name);
            },
            Err(e) => return Err(e.into()),
        }

        self.get_by_name(&name)
            .await?
            .ok_or_else(|| DomainError::NotFound(name))
    }

    /// Record a judging outcome. Counters and best-confidence only ever
    /// grow; blacklisted rows are left untouched.
    pub async fn update_quality(
        &self,
        domain_id: &str,
        confidence: Decimal,
        was_high_quality: bool,
    ) -> Result<(), DomainError> {
        let confidence = to_stored(confidence);
        let result = sqlx::query(
            r#"UPDATE domains SET
                 high_quality_count = high_quality_count + ?,
                 low_quality_count = low_quality_count + ?,
                 best_confidence_score = CASE
                     WHEN best_confidence_score IS NULL OR best_confidence_score < ? THEN ?
                     ELSE best_confidence_score
                 END,
                 last_processed_at = ?,
                 status = CASE
                     WHEN ? THEN 'PROCESSED_HIGH_QUALITY'
                     WHEN high_quality_count > 0 THEN 'PROCESSED_HIGH_QUALITY'
                     ELSE 'PROCESSED_LOW_QUALITY'
                 END
               WHERE id = ? AND status != 'BLACKLISTED'"#,
        )
        .bind(if was_high_quality { 1 } else { 0 })
        .bind(if was_high_quality { 0 } else { 1 })
        .bind(confidence)
        .bind(confidence)
        .bind(Utc::now())
        .bind(was_high_quality)
        .bind(domain_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(domain_id.to_string()));
        }
        Ok(())
    }

    /// Claim a domain for judging. DISCOVERED -> PROCESSING.
    pub async fn mark_processing(&self, domain_id: &str) -> Result<(), DomainError> {
        sqlx::query("UPDATE domains SET status = 'PROCESSING' WHERE id = ? AND status != 'BLACKLISTED'")
            .bind(domain_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Operator blacklisting. Unknown domains are inserted directly as
    /// BLACKLISTED so the name is blocked before it is ever crawled.
    pub async fn blacklist(
        &self,
        domain_name: &str,
        actor_id: &str,
        reason: &str,
    ) -> Result<Domain, DomainError> {
        let name = domain_name.trim().to_lowercase();
        let name = name.strip_prefix("www.").unwrap_or(&name).to_string();
        if name.is_empty() || !name.contains('.') {
            return Err(DomainError::InvalidUrl(domain_name.to_string()));
        }

        let now = Utc::now();
        let updated = sqlx::query(
            r#"UPDATE domains SET
                 status = 'BLACKLISTED',
                 blacklisted_by = ?, blacklisted_at = ?, blacklist_reason = ?
               WHERE name = ?"#,
        )
        .bind(actor_id)
        .bind(now)
        .bind(reason)
        .bind(&name)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"INSERT INTO domains
                     (id, name, status, discovered_at, blacklisted_by, blacklisted_at, blacklist_reason)
                   VALUES (?, ?, 'BLACKLISTED', ?, ?, ?, ?)"#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&name)
            .bind(now)
            .bind(actor_id)
            .bind(now)
            .bind(reason)
            .execute(&self.pool)
            .await?;
        }

        tracing::info!("Domain {} blacklisted by {}: {}", name, actor_id, reason);
        self.get_by_name(&name)
            .await?
            .ok_or(DomainError::NotFound(name))
    }

    /// Mark a crawl/processing failure; the domain becomes eligible
    /// again once `retry_after` has passed.
    pub async fn mark_failed(
        &self,
        domain_id: &str,
        retry_after: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"UPDATE domains SET
                 status = 'PROCESSING_FAILED', retry_after = ?, last_processed_at = ?
               WHERE id = ? AND status != 'BLACKLISTED'"#,
        )
        .bind(retry_after)
        .bind(Utc::now())
        .bind(domain_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(domain_id.to_string()));
        }
        Ok(())
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Domain>, DomainError> {
        sqlx::query_as::<_, Domain>("SELECT * FROM domains WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(DomainError::from)
    }

    pub async fn is_blacklisted(&self, name: &str) -> Result<bool, DomainError> {
        Ok(self
            .get_by_name(name)
            .await?
            .map(|d| d.status_enum() == DomainStatus::Blacklisted)
            .unwrap_or(false))
    }

    pub async fn list(&self, page: i64, size: i64) -> Result<Vec<Domain>, DomainError> {
        sqlx::query_as::<_, Domain>(
            "SELECT * FROM domains ORDER BY discovered_at DESC LIMIT ? OFFSET ?",
        )
        .bind(size)
        .bind(page * size)
        .fetch_all(&self.pool)
        .await
        .map_err(DomainError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn setup() -> DomainRegistry {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create test database");
        db::init_schema(&pool).await.expect("Failed to create schema");
        DomainRegistry::new(pool)
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn normalizes_host_and_strips_www() {
        assert_eq!(normalize_domain("https://WWW.Example.ORG/path?q=1").unwrap(), "example.org");
        assert_eq!(normalize_domain("http://us-bulgaria.org/ed-grant").unwrap(), "us-bulgaria.org");
    }

    #[test]
    fn rejects_ip_literals_and_odd_schemes() {
        assert!(normalize_domain("http://192.168.1.1/grants").is_err());
        assert!(normalize_domain("http://[::1]/grants").is_err());
        assert!(normalize_domain("ftp://example.org/file").is_err());
        assert!(normalize_domain("not a url").is_err());
        assert!(normalize_domain("http://localhost/x").is_err());
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = setup().await;

        let first = registry.register("https://example.org/a", "s1").await.unwrap();
        let second = registry.register("https://www.example.org/b", "s1").await.unwrap();
        let third = registry.register("https://example.org/c", "s2").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, third.id);
        assert_eq!(third.high_quality_count, 0);
        assert_eq!(third.low_quality_count, 0);
        assert_eq!(first.status_enum(), DomainStatus::Discovered);
    }

    #[tokio::test]
    async fn should_process_follows_the_state_machine() {
        let registry = setup().await;
        assert!(registry.should_process("https://fresh.org/x").await.unwrap());

        let domain = registry.register("https://fresh.org/x", "s1").await.unwrap();
        assert!(registry.should_process("https://fresh.org/x").await.unwrap());

        registry.mark_processing(&domain.id).await.unwrap();
        assert!(!registry.should_process("https://fresh.org/x").await.unwrap());

        registry.update_quality(&domain.id, d("0.42"), false).await.unwrap();
        assert!(!registry.should_process("https://fresh.org/x").await.unwrap());
    }

    #[tokio::test]
    async fn failed_domains_become_retryable_after_cooldown() {
        let registry = setup().await;
        let domain = registry.register("https://flaky.org/x", "s1").await.unwrap();

        registry
            .mark_failed(&domain.id, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(!registry.should_process("https://flaky.org/x").await.unwrap());

        registry
            .mark_failed(&domain.id, Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert!(registry.should_process("https://flaky.org/x").await.unwrap());
    }

    #[tokio::test]
    async fn quality_updates_are_monotonic() {
        let registry = setup().await;
        let domain = registry.register("https://good.org/x", "s1").await.unwrap();

        registry.update_quality(&domain.id, d("0.70"), true).await.unwrap();
        let after_high = registry.get_by_name("good.org").await.unwrap().unwrap();
        assert_eq!(after_high.status_enum(), DomainStatus::ProcessedHighQuality);
        assert_eq!(after_high.high_quality_count, 1);
        assert_eq!(after_high.best_confidence_score, Some(0.70));

        // A later low-quality hit must not downgrade status or best score.
        registry.update_quality(&domain.id, d("0.30"), false).await.unwrap();
        let after_low = registry.get_by_name("good.org").await.unwrap().unwrap();
        assert_eq!(after_low.status_enum(), DomainStatus::ProcessedHighQuality);
        assert_eq!(after_low.high_quality_count, 1);
        assert_eq!(after_low.low_quality_count, 1);
        assert_eq!(after_low.best_confidence_score, Some(0.70));
    }

    #[tokio::test]
    async fn only_low_quality_hits_mean_low_quality_status() {
        let registry = setup().await;
        let domain = registry.register("https://meh.org/x", "s1").await.unwrap();

        registry.update_quality(&domain.id, d("0.20"), false).await.unwrap();
        registry.update_quality(&domain.id, d("0.35"), false).await.unwrap();

        let row = registry.get_by_name("meh.org").await.unwrap().unwrap();
        assert_eq!(row.status_enum(), DomainStatus::ProcessedLowQuality);
        assert_eq!(row.low_quality_count, 2);
        assert_eq!(row.best_confidence_score, Some(0.35));
    }

    #[tokio::test]
    async fn blacklist_blocks_processing_and_survives_updates() {
        let registry = setup().await;
        registry.register("https://badsite.com/funding", "s1").await.unwrap();

        let row = registry.blacklist("badsite.com", "operator-1", "link farm").await.unwrap();
        assert_eq!(row.status_enum(), DomainStatus::Blacklisted);
        assert!(row.blacklisted_by.is_some());
        assert!(row.blacklisted_at.is_some());
        assert!(row.blacklist_reason.is_some());

        assert!(!registry.should_process("https://badsite.com/funding").await.unwrap());
        assert!(registry.is_blacklisted("badsite.com").await.unwrap());

        // Quality writes no longer touch the row.
        let err = registry.update_quality(&row.id, d("0.90"), true).await;
        assert!(err.is_err());
        let unchanged = registry.get_by_name("badsite.com").await.unwrap().unwrap();
        assert_eq!(unchanged.status_enum(), DomainStatus::Blacklisted);
    }

    #[tokio::test]
    async fn blacklisting_an_unknown_domain_inserts_it() {
        let registry = setup().await;
        let row = registry.blacklist("www.spam.click.example", "op", "ads").await.unwrap();
        assert_eq!(row.name, "spam.click.example");
        assert_eq!(row.status_enum(), DomainStatus::Blacklisted);
        assert!(!registry.should_process("https://spam.click.example/x").await.unwrap());
    }
}
