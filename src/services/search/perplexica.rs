//! Perplexica adapter.
//!
//! Self-hosted AI search (Perplexity-style). Takes a full-sentence
//! query; sources come back with their page content and metadata.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{AdapterError, SearchAdapter, ensure_success};
use crate::config::EngineConfig;
use crate::models::{SearchEngine, SearchResult};

pub struct PerplexicaAdapter {
    config: EngineConfig,
    client: Client,
}

impl PerplexicaAdapter {
    pub fn new(config: EngineConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[derive(Debug, Deserialize)]
struct PerplexicaResponse {
    #[serde(default)]
    sources: Vec<PerplexicaSource>,
}

#[derive(Debug, Deserialize)]
struct PerplexicaSource {
    #[serde(rename = "pageContent", default)]
    page_content: String,
    #[serde(default)]
    metadata: PerplexicaMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct PerplexicaMetadata {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
}

#[async_trait]
impl SearchAdapter for PerplexicaAdapter {
    fn engine(&self) -> SearchEngine {
        SearchEngine::Perplexica
    }

    fn enabled(&self) -> bool {
        self.config.enabled && !self.config.base_url.is_empty()
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        let url = format!("{}/api/search", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "focusMode": "webSearch",
                "optimizationMode": "balanced",
                "query": query,
            }))
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(e, self.config.timeout_secs))?;

        let response = ensure_success(response).await?;
        let body: PerplexicaResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

        let fetched_at = Utc::now();
        let results = body
            .sources
            .into_iter()
            .filter(|s| !s.metadata.url.trim().is_empty())
            .take(max_results as usize)
            .enumerate()
            .map(|(i, s)| SearchResult {
                url: s.metadata.url,
                title: s.metadata.title,
                snippet: s.page_content,
                engine: SearchEngine::Perplexica,
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
