//! Domain Models
//!
//! A domain is the registrable host portion of a URL, normalized
//! lowercase with any leading `www.` stripped. The registry is the
//! only writer of this table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Domain processing lifecycle.
///
/// DISCOVERED -> PROCESSING -> one of the PROCESSED_*/failure states.
/// BLACKLISTED is terminal except by operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainStatus {
    Discovered,
    Processing,
    ProcessedHighQuality,
    ProcessedLowQuality,
    NoFundsThisYear,
    ProcessingFailed,
    Blacklisted,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "DISCOVERED",
            Self::Processing => "PROCESSING",
            Self::ProcessedHighQuality => "PROCESSED_HIGH_QUALITY",
            Self::ProcessedLowQuality => "PROCESSED_LOW_QUALITY",
            Self::NoFundsThisYear => "NO_FUNDS_THIS_YEAR",
            Self::ProcessingFailed => "PROCESSING_FAILED",
            Self::Blacklisted => "BLACKLISTED",
        }
    }

    pub fn parse_status(s: &str) -> Self {
        match s {
            "DISCOVERED" => Self::Discovered,
            "PROCESSING" => Self::Processing,
            "PROCESSED_HIGH_QUALITY" => Self::ProcessedHighQuality,
            "PROCESSED_LOW_QUALITY" => Self::ProcessedLowQuality,
            "NO_FUNDS_THIS_YEAR" => Self::NoFundsThisYear,
            "PROCESSING_FAILED" => Self::ProcessingFailed,
            "BLACKLISTED" => Self::Blacklisted,
            _ => Self::Discovered,
        }
    }
}

/// Persisted domain row.
///
/// Invariants: `name` is immutable once written; the quality counters
/// only grow; `best_confidence_score` is monotonic non-decreasing;
/// the three blacklist fields are all set or all null.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Domain {
    pub id: String,
    pub name: String,
    pub status: String,
    pub discovered_at: DateTime<Utc>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub high_quality_count: i64,
    pub low_quality_count: i64,
    pub best_confidence_score: Option<f64>,
    pub blacklisted_by: Option<String>,
    pub blacklisted_at: Option<DateTime<Utc>>,
    pub blacklist_reason: Option<String>,
    pub retry_after: Option<DateTime<Utc>>,
}

impl Domain {
    pub fn status_enum(&self) -> DomainStatus {
        DomainStatus::parse_status(&self.status)
    }
}

/// Request body for the operator blacklist endpoint.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BlacklistDomainRequest {
    pub domain: String,
    pub reason: String,
}
