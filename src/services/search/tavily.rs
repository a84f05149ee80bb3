//! Tavily adapter.
//!
//! AI-augmented engine; takes full-sentence queries and returns
//! summarized sources under `results`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{AdapterError, SearchAdapter, ensure_success};
use crate::config::EngineConfig;
use crate::models::{SearchEngine, SearchResult};

pub struct TavilyAdapter {
    config: EngineConfig,
    client: Client,
}

impl TavilyAdapter {
    pub fn new(config: EngineConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn api_key(&self) -> Result<&str, AdapterError> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AdapterError::AuthFailed("Tavily API key not configured".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl SearchAdapter for TavilyAdapter {
    fn engine(&self) -> SearchEngine {
        SearchEngine::Tavily
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
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "api_key": api_key,
                "query": query,
                "max_results": max_results,
                "search_depth": "basic",
            }))
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(e, self.config.timeout_secs))?;

        let response = ensure_success(response).await?;
        let body: TavilyResponse = response
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
                engine: SearchEngine::Tavily,
                query: query.to_string(),
                position: (i + 1) as u32,
                fetched_at,
            })
            .collect();

        Ok(results)
    }

    async fn health(&self) -> bool {
        self.enabled() && self.api_key().is_ok()
    }
}
