//! Metadata Judge
//!
//! Phase 1 scoring: decides from URL, title, and snippet alone whether
//! a search result deserves a full crawl. Four weighted judges vote;
//! the weighted average, rounded half-up at scale 2, is the
//! confidence. Keywords, weights, and the threshold are configuration.

use rust_decimal::Decimal;
use rust_decimal::prelude::*;

use crate::config::JudgeConfig;
use crate::models::SearchResult;
use crate::services::domain_registry::normalize_domain;
use crate::utils::decimal::clamp_confidence;

/// One judge's weighted vote.
#[derive(Debug, Clone)]
pub struct JudgeScore {
    pub judge: &'static str,
    pub score: Decimal,
    pub weight: Decimal,
    pub explanation: String,
}

/// The verdict for a single search result.
#[derive(Debug, Clone)]
pub struct MetadataJudgment {
    pub confidence: Decimal,
    pub should_crawl: bool,
    pub judge_scores: Vec<JudgeScore>,
    pub reasoning: String,
    pub organization_name: String,
    pub program_name: String,
    pub domain_name: String,
}

pub struct MetadataJudge {
    config: JudgeConfig,
}

impl MetadataJudge {
    pub fn new(config: JudgeConfig) -> Self {
        Self { config }
    }

    /// Deterministic on the same (result, configuration).
    pub fn judge(&self, result: &SearchResult) -> MetadataJudgment {
        let text = format!("{} {}", result.title, result.snippet).to_lowercase();

        let scores = vec![
            self.funding_keyword_judge(&text),
            self.domain_credibility_judge(&result.url),
            self.geographic_relevance_judge(&text),
            self.organization_type_judge(&text),
        ];

        let weighted_sum: Decimal = scores.iter().map(|s| s.score * s.weight).sum();
        let weight_sum: Decimal = scores.iter().map(|s| s.weight).sum();
        let confidence = if weight_sum.is_zero() {
            Decimal::ZERO
        } else {
            clamp_confidence(weighted_sum / weight_sum)
        };

        let threshold =
            Decimal::from_f64(self.config.confidence_threshold).unwrap_or(Decimal::ONE);
        let should_crawl = confidence >= threshold;

        let reasoning = scores
            .iter()
            .map(|s| format!("{}: {} ({})", s.judge, s.score, s.explanation))
            .collect::<Vec<_>>()
            .join("; ");

        let (program_name, organization_name) = extract_names(&result.title);
        let domain_name = normalize_domain(&result.url).unwrap_or_default();

        MetadataJudgment {
            confidence,
            should_crawl,
            judge_scores: scores,
            reasoning,
            organization_name,
            program_name,
            domain_name,
        }
    }

    fn funding_keyword_judge(&self, text: &str) -> JudgeScore {
        let (score, matched) =
            saturating_keyword_score(text, &self.config.funding_keywords, self.config.funding_saturation);
        JudgeScore {
            judge: "funding_keyword",
            score,
            weight: weight(self.config.funding_weight),
            explanation: explain_matches(&matched),
        }
    }

    fn domain_credibility_judge(&self, url: &str) -> JudgeScore {
        let url_lower = url.to_lowercase();
        let weight = weight(self.config.credibility_weight);

        if self
            .config
            .scam_patterns
            .iter()
            .any(|p| !p.is_empty() && url_lower.contains(&p.to_lowercase()))
        {
            return JudgeScore {
                judge: "domain_credibility",
                score: Decimal::ZERO,
                weight,
                explanation: "url matches a scam pattern".to_string(),
            };
        }

        let tld = normalize_domain(url)
            .ok()
            .and_then(|d| d.rsplit('.').next().map(|t| t.to_string()))
            .unwrap_or_default();

        if self.config.credible_tlds.iter().any(|t| t.eq_ignore_ascii_case(&tld)) {
            JudgeScore {
                judge: "domain_credibility",
                score: Decimal::new(80, 2),
                weight,
                explanation: format!("credible top-level domain .{}", tld),
            }
        } else {
            JudgeScore {
                judge: "domain_credibility",
                score: Decimal::new(50, 2),
                weight,
                explanation: "neutral top-level domain".to_string(),
            }
        }
    }

    fn geographic_relevance_judge(&self, text: &str) -> JudgeScore {
        let (score, matched) = saturating_keyword_score(
            text,
            &self.config.geographic_keywords,
            self.config.geographic_saturation,
        );
        JudgeScore {
            judge: "geographic_relevance",
            score,
            weight: weight(self.config.geographic_weight),
            explanation: explain_matches(&matched),
        }
    }

    fn organization_type_judge(&self, text: &str) -> JudgeScore {
        let (score, matched) = saturating_keyword_score(
            text,
            &self.config.organization_keywords,
            self.config.organization_saturation,
        );
        JudgeScore {
            judge: "organization_type",
            score,
            weight: weight(self.config.organization_weight),
            explanation: explain_matches(&matched),
        }
    }
}

/// score = min(1.00, matches / saturation), scale 2.
fn saturating_keyword_score(
    text: &str,
    keywords: &[String],
    saturation: u32,
) -> (Decimal, Vec<String>) {
    let matched: Vec<String> = keywords
        .iter()
        .filter(|k| !k.is_empty() && text.contains(&k.to_lowercase()))
        .cloned()
        .collect();

    let saturation = saturation.max(1);
    let raw = Decimal::from(matched.len() as u64) / Decimal::from(saturation);
    (clamp_confidence(raw), matched)
}

fn explain_matches(matched: &[String]) -> String {
    if matched.is_empty() {
        "no keyword matches".to_string()
    } else {
        format!("matched: {}", matched.join(", "))
    }
}

fn weight(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ONE)
}

/// Heuristic (program, organization) extraction from a result title.
///
/// The last delimiter-separated segment is the organization, the first
/// is the program. Delimiters must be surrounded by spaces so that
/// hyphenated names like "US-Bulgaria" survive.
fn extract_names(title: &str) -> (String, String) {
    const DELIMITERS: [&str; 4] = [" - ", " \u{2013} ", " \u{2014} ", " | "];

    let title = title.trim();
    for delim in DELIMITERS {
        if title.contains(delim) {
            let segments: Vec<&str> = title.split(delim).map(str::trim).collect();
            if segments.len() >= 2 {
                let program = segments.first().copied().unwrap_or_default();
                let organization = segments.last().copied().unwrap_or_default();
                if !program.is_empty() && !organization.is_empty() {
                    return (program.to_string(), organization.to_string());
                }
            }
        }
    }

    (title.to_string(), "Unknown Organization".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchEngine;
    use chrono::Utc;

    fn judge() -> MetadataJudge {
        MetadataJudge::new(JudgeConfig::default())
    }

    fn result(url: &str, title: &str, snippet: &str) -> SearchResult {
        SearchResult {
            url: url.to_string(),
            title: title.to_string(),
            snippet: snippet.to_string(),
            engine: SearchEngine::Searxng,
            query: "bulgaria education grants".to_string(),
            position: 1,
            fetched_at: Utc::now(),
        }
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn credible_org_result_clears_threshold() {
        let judgment = judge().judge(&result(
            "https://us-bulgaria.org/ed-grant",
            "Bulgaria Education Grant - US-Bulgaria Foundation",
            "Grants and scholarships for Bulgarian students...",
        ));

        assert!(judgment.should_crawl);
        assert!(judgment.confidence >= d("0.60"));
        assert_eq!(judgment.program_name, "Bulgaria Education Grant");
        assert_eq!(judgment.organization_name, "US-Bulgaria Foundation");
        assert_eq!(judgment.domain_name, "us-bulgaria.org");
    }

    #[test]
    fn known_configuration_is_deterministic_and_high() {
        let r = result(
            "https://www.osf.org/stem",
            "Bulgaria STEM Fellowship \u{2013} Open Society Foundation",
            "Fellowships for Bulgarian researchers; grants up to 50000 EUR; deadline 2026.",
        );
        let first = judge().judge(&r);
        let second = judge().judge(&r);

        assert_eq!(first.confidence, second.confidence);
        assert!(first.confidence >= d("0.88"), "confidence was {}", first.confidence);
        assert!(first.should_crawl);
        assert_eq!(first.program_name, "Bulgaria STEM Fellowship");
        assert_eq!(first.organization_name, "Open Society Foundation");
    }

    #[test]
    fn empty_title_and_snippet_never_crawls() {
        let judgment = judge().judge(&result("https://example.com/page", "", ""));
        assert!(!judgment.should_crawl);
        assert!(judgment.confidence < d("0.60"));
    }

    #[test]
    fn scam_pattern_zeroes_credibility() {
        let judgment = judge().judge(&result(
            "http://grants.example/free-money",
            "Grants",
            "grant money",
        ));
        let credibility = judgment
            .judge_scores
            .iter()
            .find(|s| s.judge == "domain_credibility")
            .unwrap();
        assert_eq!(credibility.score, Decimal::ZERO);
    }

    #[test]
    fn title_without_separator_falls_back() {
        let (program, organization) = extract_names("Funding opportunities in Bulgaria");
        assert_eq!(program, "Funding opportunities in Bulgaria");
        assert_eq!(organization, "Unknown Organization");
    }

    #[test]
    fn four_judges_vote() {
        let judgment = judge().judge(&result("https://a.org", "grants", "bulgaria foundation"));
        assert_eq!(judgment.judge_scores.len(), 4);
        let names: Vec<&str> = judgment.judge_scores.iter().map(|s| s.judge).collect();
        assert_eq!(
            names,
            vec!["funding_keyword", "domain_credibility", "geographic_relevance", "organization_type"]
        );
    }
}
