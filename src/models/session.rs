//! Discovery Session Models
//!
//! One session is one execution of the pipeline. Engine sets persist
//! as JSON text arrays of uppercase engine names; per-engine counter
//! and failure maps persist as JSON objects keyed by engine name.
//! Conversion happens here, at the persistence boundary, not in the
//! pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::search::SearchEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    Scheduled,
    Manual,
    Retry,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Manual => "MANUAL",
            Self::Retry => "RETRY",
        }
    }

    pub fn parse_type(s: &str) -> Self {
        match s {
            "SCHEDULED" => Self::Scheduled,
            "RETRY" => Self::Retry,
            _ => Self::Manual,
        }
    }
}

/// Session lifecycle. CANCELLED is reachable from RUNNING only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl DiscoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse_status(s: &str) -> Self {
        match s {
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

/// Persisted discovery session row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DiscoverySession {
    pub id: String,
    pub session_type: String,
    pub status: String,
    pub executed_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub candidates_found: i64,
    pub duplicates_detected: i64,
    pub average_confidence_score: Option<f64>,
    /// JSON array of uppercase engine names.
    pub search_engines_used: String,
    /// JSON array of query strings.
    pub search_queries: String,
    /// JSON object: engine name -> result count.
    pub engine_result_counts: String,
    /// JSON object: engine name -> list of error descriptions.
    pub engine_failures: String,
    pub prompt_id: Option<String>,
    pub language_model: Option<String>,
}

impl DiscoverySession {
    pub fn status_enum(&self) -> DiscoveryStatus {
        DiscoveryStatus::parse_status(&self.status)
    }

    pub fn type_enum(&self) -> SessionType {
        SessionType::parse_type(&self.session_type)
    }

    pub fn engines(&self) -> Vec<SearchEngine> {
        serde_json::from_str::<Vec<String>>(&self.search_engines_used)
            .unwrap_or_default()
            .iter()
            .filter_map(|s| SearchEngine::parse_engine(s))
            .collect()
    }

    pub fn queries(&self) -> Vec<String> {
        serde_json::from_str(&self.search_queries).unwrap_or_default()
    }

    pub fn result_counts(&self) -> HashMap<String, i64> {
        serde_json::from_str(&self.engine_result_counts).unwrap_or_default()
    }

    pub fn failures(&self) -> HashMap<String, Vec<String>> {
        serde_json::from_str(&self.engine_failures).unwrap_or_default()
    }
}

/// API view of a session with the JSON columns expanded.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DiscoverySessionResponse {
    pub id: String,
    pub session_type: SessionType,
    pub status: DiscoveryStatus,
    pub executed_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub candidates_found: i64,
    pub duplicates_detected: i64,
    pub average_confidence_score: Option<f64>,
    pub search_engines_used: Vec<String>,
    pub search_queries: Vec<String>,
    pub engine_result_counts: HashMap<String, i64>,
    pub engine_failures: HashMap<String, Vec<String>>,
    pub language_model: Option<String>,
}

impl From<DiscoverySession> for DiscoverySessionResponse {
    fn from(s: DiscoverySession) -> Self {
        Self {
            session_type: s.type_enum(),
            status: s.status_enum(),
            search_engines_used: serde_json::from_str(&s.search_engines_used).unwrap_or_default(),
            search_queries: s.queries(),
            engine_result_counts: s.result_counts(),
            engine_failures: s.failures(),
            id: s.id,
            executed_at: s.executed_at,
            started_at: s.started_at,
            completed_at: s.completed_at,
            duration_minutes: s.duration_minutes,
            candidates_found: s.candidates_found,
            duplicates_detected: s.duplicates_detected,
            average_confidence_score: s.average_confidence_score,
            language_model: s.language_model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_json_columns_round_trip() {
        let mut failures = HashMap::new();
        failures.insert("SERPER".to_string(), vec!["CircuitOpen".to_string()]);

        let session = DiscoverySession {
            id: "s1".to_string(),
            session_type: "MANUAL".to_string(),
            status: "COMPLETED".to_string(),
            executed_at: Utc::now(),
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            duration_minutes: Some(1),
            candidates_found: 2,
            duplicates_detected: 0,
            average_confidence_score: Some(0.71),
            search_engines_used: r#"["SEARXNG","SERPER"]"#.to_string(),
            search_queries: r#"["bulgaria education grants"]"#.to_string(),
            engine_result_counts: r#"{"SEARXNG":3}"#.to_string(),
            engine_failures: serde_json::to_string(&failures).unwrap(),
            prompt_id: None,
            language_model: Some("qwen2.5:7b".to_string()),
        };

        assert_eq!(session.engines(), vec![SearchEngine::Searxng, SearchEngine::Serper]);
        assert_eq!(session.queries(), vec!["bulgaria education grants"]);
        assert_eq!(session.result_counts().get("SEARXNG"), Some(&3));
        assert_eq!(session.failures().get("SERPER").map(Vec::len), Some(1));
        assert_eq!(session.status_enum(), DiscoveryStatus::Completed);
    }
}
