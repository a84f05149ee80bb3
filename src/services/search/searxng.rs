//! SearXNG adapter.
//!
//! Self-hosted meta-search, contacted over plain HTTP with
//! `format=json`. Result fields `url`, `title`, `content`; the last
//! becomes the snippet.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use super::{AdapterError, SearchAdapter, ensure_success};
use crate::config::EngineConfig;
use crate::models::{SearchEngine, SearchResult};

pub struct SearxngAdapter {
    config: EngineConfig,
    client: Client,
}

impl SearxngAdapter {
    pub fn new(config: EngineConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl SearchAdapter for SearxngAdapter {
    fn engine(&self) -> SearchEngine {
        SearchEngine::Searxng
    }

    fn enabled(&self) -> bool {
        self.config.enabled && !self.config.base_url.is_empty()
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json")])
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(e, self.config.timeout_secs))?;

        let response = ensure_success(response).await?;
        let body: SearxngResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

        let fetched_at = Utc::now();
        let results = body
            .results
            .into_iter()
            .filter(|r| !r.url.trim().is_empty())
            .take(max_results as usize)
            .enumerate()
            .map(|(i, r)| SearchResult {
                url: r.url,
                title: r.title,
                snippet: r.content,
                engine: SearchEngine::Searxng,
                query: query.to_string(),
                position: (i + 1) as u32,
                fetched_at,
            })
            .collect();

        Ok(results)
    }

    async fn health(&self) -> bool {
        if !self.enabled() {
            return false;
        }
        self.client
            .get(self.config.base_url.trim_end_matches('/'))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
