//! Funding Candidate Models
//!
//! A candidate is a discovered opportunity awaiting the Phase 2 crawl
//! and eventual human review. This core only ever writes rows in
//! PENDING_CRAWL; the review workflow owns the other states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateStatus {
    PendingCrawl,
    PendingReview,
    Approved,
    Rejected,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingCrawl => "PENDING_CRAWL",
            Self::PendingReview => "PENDING_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse_status(s: &str) -> Self {
        match s {
            "PENDING_REVIEW" => Self::PendingReview,
            "APPROVED" => Self::Approved,
            "REJECTED" => Self::Rejected,
            _ => Self::PendingCrawl,
        }
    }
}

/// Persisted candidate row. Owned by one session, references a shared
/// domain; deleting a candidate touches neither.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct FundingCandidate {
    pub id: String,
    pub session_id: String,
    pub domain_id: String,
    pub status: String,
    /// Scale-2 decimal stored as REAL; converted at this boundary only.
    pub confidence_score: f64,
    pub source_url: String,
    pub discovered_at: DateTime<Utc>,
    pub organization_name: String,
    pub program_name: String,
    pub description: String,
    pub judge_reasoning: String,
    pub source_query: String,
}

impl FundingCandidate {
    pub fn status_enum(&self) -> CandidateStatus {
        CandidateStatus::parse_status(&self.status)
    }
}
