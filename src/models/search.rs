//! Search Engine Models
//!
//! Engine enumeration, structured query requests, and the common
//! search-result shape every adapter maps its vendor response into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

// ============================================================================
// Search Engines
// ============================================================================

/// The set of search providers the pipeline knows how to talk to.
///
/// Only adapter code may branch on specific variants; everything else
/// treats the engine as an opaque tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchEngine {
    Brave,
    Serper,
    Searxng,
    Tavily,
    Perplexica,
}

/// How an engine wants its queries phrased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Short keyword phrases for classical ranking.
    Keyword,
    /// Full-sentence prompts for AI-augmented search.
    Prompt,
}

impl SearchEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brave => "BRAVE",
            Self::Serper => "SERPER",
            Self::Searxng => "SEARXNG",
            Self::Tavily => "TAVILY",
            Self::Perplexica => "PERPLEXICA",
        }
    }

    /// Parse an engine name, case-insensitive. "perplexity" is accepted
    /// as an alias for the self-hosted Perplexica deployment.
    pub fn parse_engine(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BRAVE" => Some(Self::Brave),
            "SERPER" => Some(Self::Serper),
            "SEARXNG" => Some(Self::Searxng),
            "TAVILY" => Some(Self::Tavily),
            "PERPLEXICA" | "PERPLEXITY" => Some(Self::Perplexica),
            _ => None,
        }
    }

    pub fn query_kind(&self) -> QueryKind {
        match self {
            Self::Brave | Self::Serper | Self::Searxng => QueryKind::Keyword,
            Self::Tavily | Self::Perplexica => QueryKind::Prompt,
        }
    }

    pub fn all() -> [SearchEngine; 5] {
        [Self::Brave, Self::Serper, Self::Searxng, Self::Tavily, Self::Perplexica]
    }
}

impl std::fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Funding Categories
// ============================================================================

/// Broad funding areas a discovery run targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum FundingCategory {
    Education,
    ArtsCulture,
    Healthcare,
    SocialServices,
    Environment,
    Research,
    CommunityDevelopment,
    YouthDevelopment,
}

impl FundingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Education => "education",
            Self::ArtsCulture => "arts_culture",
            Self::Healthcare => "healthcare",
            Self::SocialServices => "social_services",
            Self::Environment => "environment",
            Self::Research => "research",
            Self::CommunityDevelopment => "community_development",
            Self::YouthDevelopment => "youth_development",
        }
    }

    /// Tag form used when persisting query metadata, e.g. `CATEGORY:education`.
    pub fn as_tag(&self) -> String {
        format!("CATEGORY:{}", self.as_str())
    }
}

// ============================================================================
// Query Request / Cache Key / Generated Queries
// ============================================================================

/// Structured input to query generation. Created by the caller,
/// consumed once.
#[derive(Debug, Clone, Validate)]
pub struct QueryRequest {
    pub engine: SearchEngine,
    #[validate(length(min = 1, message = "at least one funding category is required"))]
    pub categories: Vec<FundingCategory>,
    #[validate(length(min = 1, message = "geographic scope must not be empty"))]
    pub geography: String,
    pub recipient: Option<String>,
    pub mechanism: Option<String>,
    pub beneficiary: Option<String>,
    #[validate(range(min = 1, max = 50, message = "query count must be between 1 and 50"))]
    pub count: u32,
    pub session_id: String,
}

impl QueryRequest {
    /// Tag form of the geographic scope, e.g. `GEOGRAPHY:Bulgaria`.
    pub fn geography_tag(&self) -> String {
        format!("GEOGRAPHY:{}", self.geography)
    }
}

/// Fingerprint of a [`QueryRequest`] for cache lookup.
///
/// Identity-bearing fields only: engine, the category *set*, the
/// geographic scope, and the requested count. Session id and the
/// optional personalization tags are deliberately ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryCacheKey {
    engine: SearchEngine,
    categories: Vec<FundingCategory>,
    geography: String,
    count: u32,
}

impl QueryCacheKey {
    pub fn from_request(req: &QueryRequest) -> Self {
        let mut categories = req.categories.clone();
        categories.sort();
        categories.dedup();
        Self {
            engine: req.engine,
            categories,
            geography: req.geography.trim().to_lowercase(),
            count: req.count,
        }
    }

    pub fn engine(&self) -> SearchEngine {
        self.engine
    }

    /// Stable text form, persisted alongside generated queries so a
    /// stored row can be tied back to its cache slot.
    pub fn as_tag_string(&self) -> String {
        let mut parts: Vec<String> = self.categories.iter().map(|c| c.as_tag()).collect();
        parts.push(format!("GEOGRAPHY:{}", self.geography));
        parts.push(format!("COUNT:{}", self.count));
        format!("{}|{}", self.engine.as_str(), parts.join("|"))
    }
}

/// The outcome of query generation for one engine.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedQueries {
    pub engine: SearchEngine,
    pub queries: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub from_cache: bool,
}

// ============================================================================
// Search Results
// ============================================================================

/// A single result as returned by an adapter, already mapped out of
/// the vendor's response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub engine: SearchEngine,
    /// The query text that produced this result.
    pub query: String,
    /// 1-based rank position within the engine's result list.
    pub position: u32,
    pub fetched_at: DateTime<Utc>,
}
