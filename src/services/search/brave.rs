//! Brave Search API adapter.
//!
//! Keyword-style engine; authenticated with the `X-Subscription-Token`
//! header. Results live under `web.results`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use super::{AdapterError, SearchAdapter, ensure_success};
use crate::config::EngineConfig;
use crate::models::{SearchEngine, SearchResult};

pub struct BraveAdapter {
    config: EngineConfig,
    client: Client,
}

impl BraveAdapter {
    pub fn new(config: EngineConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn api_key(&self) -> Result<&str, AdapterError> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AdapterError::AuthFailed("Brave API key not configured".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl SearchAdapter for BraveAdapter {
    fn engine(&self) -> SearchEngine {
        SearchEngine::Brave
    }

    fn enabled(&self) -> bool {
        self.config.enabled && !self.config.base_url.is_empty()
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchResult>, AdapterError> {
        let api_key = self.api_key()?;
        let url = format!("{}/res/v1/web/search", self.config.base_url.trim_end_matches('/'));
        let count = max_results.clamp(1, 20).to_string();

        let response = self
            .client
            .get(&url)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", count.as_str())])
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(e, self.config.timeout_secs))?;

        let response = ensure_success(response).await?;
        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

        let fetched_at = Utc::now();
        let results = body
            .web
            .results
            .into_iter()
            .filter(|r| !r.url.trim().is_empty())
            .take(max_results as usize)
            .enumerate()
            .map(|(i, r)| SearchResult {
                url: r.url,
                title: r.title,
                snippet: r.description,
                engine: SearchEngine::Brave,
                query: query.to_string(),
                position: (i + 1) as u32,
                fetched_at,
            })
            .collect();

        Ok(results)
    }

    async fn health(&self) -> bool {
        // Brave bills per request; key presence is the health signal.
        self.enabled() && self.api_key().is_ok()
    }
}
