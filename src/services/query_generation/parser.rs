//! Model-output parsing for generated queries.
//!
//! Chat models decorate lists with numbering, bullets, quotes, and
//! preambles like "Here are five queries:". Everything but the query
//! text is stripped here.

use once_cell::sync::Lazy;
use regex::Regex;

static LIST_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d+\s*[.)\-:]|[-*•])\s*").expect("invalid list prefix regex"));

const PREAMBLE_STARTS: [&str; 6] =
    ["here are", "here is", "sure", "certainly", "below are", "these are"];

/// Extract up to `max` query strings from raw model output.
pub fn parse_query_lines(text: &str, max: usize) -> Vec<String> {
    let mut queries: Vec<String> = Vec::new();

    for line in text.lines() {
        let line = LIST_PREFIX.replace(line, "");
        let line = line.trim().trim_matches(['"', '\'', '`']).trim();

        if line.is_empty() {
            continue;
        }

        let lower = line.to_lowercase();
        if line.ends_with(':') || PREAMBLE_STARTS.iter().any(|p| lower.starts_with(p)) {
            continue;
        }

        if !queries.iter().any(|q| q == line) {
            queries.push(line.to_string());
        }
        if queries.len() >= max {
            break;
        }
    }

    queries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_numbering_bullets_and_quotes() {
        let text = "1. \"bulgaria education grants\"\n2) bulgarian scholarship fund\n- ngo funding bulgaria\n* sofia community grants";
        let queries = parse_query_lines(text, 10);
        assert_eq!(
            queries,
            vec![
                "bulgaria education grants",
                "bulgarian scholarship fund",
                "ngo funding bulgaria",
                "sofia community grants",
            ]
        );
    }

    #[test]
    fn drops_preambles_and_headers() {
        let text = "Here are 3 queries:\nSearch queries:\nbulgaria grants\n\nfunding bulgaria ngo";
        let queries = parse_query_lines(text, 10);
        assert_eq!(queries, vec!["bulgaria grants", "funding bulgaria ngo"]);
    }

    #[test]
    fn caps_and_dedups() {
        let text = "a query\na query\nsecond query\nthird query";
        let queries = parse_query_lines(text, 2);
        assert_eq!(queries, vec!["a query", "second query"]);
    }

    #[test]
    fn empty_input_yields_no_queries() {
        assert!(parse_query_lines("", 5).is_empty());
        assert!(parse_query_lines("Here are the queries:\n", 5).is_empty());
    }
}
