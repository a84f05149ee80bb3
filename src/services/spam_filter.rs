//! Anti-Spam Filter
//!
//! Pure, deterministic check on a search result before any downstream
//! work. All patterns and exemplars come from configuration.

use url::Url;

use crate::config::SpamFilterConfig;
use crate::models::SearchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamReason {
    BlockedHost,
    SpamMarker,
    EmptyContent,
    KnownSpamTitle,
}

impl SpamReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockedHost => "blocked_host",
            Self::SpamMarker => "spam_marker",
            Self::EmptyContent => "empty_content",
            Self::KnownSpamTitle => "known_spam_title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamVerdict {
    Accepted,
    Rejected(SpamReason),
}

impl SpamVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

pub struct SpamFilter {
    config: SpamFilterConfig,
}

impl SpamFilter {
    pub fn new(config: SpamFilterConfig) -> Self {
        Self { config }
    }

    pub fn check(&self, result: &SearchResult) -> SpamVerdict {
        let title = result.title.trim();
        let snippet = result.snippet.trim();

        if title.is_empty() && snippet.is_empty() {
            return SpamVerdict::Rejected(SpamReason::EmptyContent);
        }

        let (host, path) = match Url::parse(&result.url) {
            Ok(url) => (
                url.host_str().unwrap_or_default().to_lowercase(),
                url.path().to_lowercase(),
            ),
            Err(_) => (String::new(), result.url.to_lowercase()),
        };

        if self
            .config
            .blocked_host_patterns
            .iter()
            .any(|p| !p.is_empty() && host.contains(&p.to_lowercase()))
        {
            return SpamVerdict::Rejected(SpamReason::BlockedHost);
        }

        let title_lower = title.to_lowercase();
        if self
            .config
            .spam_markers
            .iter()
            .map(|m| m.to_lowercase())
            .any(|m| !m.is_empty() && (path.contains(&m) || title_lower.contains(&m)))
        {
            return SpamVerdict::Rejected(SpamReason::SpamMarker);
        }

        let snippet_lower = snippet.to_lowercase();
        for exemplar in &self.config.known_spam_titles {
            let exemplar = exemplar.to_lowercase();
            if similarity(&title_lower, &exemplar) >= self.config.similarity_threshold
                || similarity(&snippet_lower, &exemplar) >= self.config.similarity_threshold
            {
                return SpamVerdict::Rejected(SpamReason::KnownSpamTitle);
            }
        }

        SpamVerdict::Accepted
    }
}

/// Levenshtein similarity in [0.0, 1.0]; 1.0 means identical.
fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

fn levenshtein(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }
    if a.is_empty() {
        return b.chars().count();
    }
    if b.is_empty() {
        return a.chars().count();
    }

    let b_chars: Vec<char> = b.chars().collect();
    let mut prev_row: Vec<usize> = (0..=b_chars.len()).collect();
    let mut cur_row = vec![0; b_chars.len() + 1];

    for (i, a_ch) in a.chars().enumerate() {
        cur_row[0] = i + 1;
        for (j, b_ch) in b_chars.iter().enumerate() {
            let cost = usize::from(a_ch != *b_ch);
            cur_row[j + 1] = (prev_row[j + 1] + 1)
                .min(cur_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        prev_row.copy_from_slice(&cur_row);
    }

    prev_row[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchEngine;
    use chrono::Utc;

    fn result(url: &str, title: &str, snippet: &str) -> SearchResult {
        SearchResult {
            url: url.to_string(),
            title: title.to_string(),
            snippet: snippet.to_string(),
            engine: SearchEngine::Searxng,
            query: "bulgaria grants".to_string(),
            position: 1,
            fetched_at: Utc::now(),
        }
    }

    fn filter() -> SpamFilter {
        SpamFilter::new(SpamFilterConfig::default())
    }

    #[test]
    fn accepts_a_normal_result() {
        let verdict = filter().check(&result(
            "https://us-bulgaria.org/ed-grant",
            "Bulgaria Education Grant - US-Bulgaria Foundation",
            "Grants and scholarships for Bulgarian students",
        ));
        assert!(verdict.is_accepted());
    }

    #[test]
    fn rejects_blocked_hosts() {
        let verdict = filter().check(&result(
            "http://click.promo.example/ad?q=bulgaria+grants",
            "Bulgaria Grants",
            "grants",
        ));
        assert_eq!(verdict, SpamVerdict::Rejected(SpamReason::BlockedHost));
    }

    #[test]
    fn rejects_spam_markers_in_title() {
        let verdict = filter().check(&result(
            "https://example.com/grants",
            "Bulgaria Grants!!! Click Now",
            "grants",
        ));
        assert_eq!(verdict, SpamVerdict::Rejected(SpamReason::SpamMarker));
    }

    #[test]
    fn rejects_empty_title_and_snippet() {
        let verdict = filter().check(&result("https://example.com", "  ", ""));
        assert_eq!(verdict, SpamVerdict::Rejected(SpamReason::EmptyContent));
    }

    #[test]
    fn rejects_near_duplicate_of_known_spam() {
        let verdict = filter().check(&result(
            "https://example.net/offer",
            "Claim your free grant money today!",
            "something",
        ));
        assert_eq!(verdict, SpamVerdict::Rejected(SpamReason::KnownSpamTitle));
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("grant", "grant"), 0);
        assert_eq!(levenshtein("grant", "grants"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn deterministic_on_same_input() {
        let f = filter();
        let r = result("https://example.org/a", "Funding for schools", "grants for schools");
        assert_eq!(f.check(&r), f.check(&r));
    }
}
