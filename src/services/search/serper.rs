//! Serper.dev adapter (Google SERP API).
//!
//! Keyword-style engine; POST with an `X-API-KEY` header, organic
//! results under `organic`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{AdapterError, SearchAdapter, ensure_success};
use crate::config::EngineConfig;
use crate::models::{SearchEngine, SearchResult};

pub struct SerperAdapter {
    config: EngineConfig,
    client: Client,
}

impl SerperAdapter {
    pub fn new(config: EngineConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn api_key(&self) -> Result<&str, AdapterError> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AdapterError::AuthFailed("Serper API key not configured".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    position: Option<u32>,
}

#[async_trait]
impl SearchAdapter for SerperAdapter {
    fn engine(&self) -> SearchEngine {
        SearchEngine::Serper
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
            .header("X-API-KEY", api_key)
            .json(&json!({ "q": query, "num": max_results }))
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(e, self.config.timeout_secs))?;

        let response = ensure_success(response).await?;
        let body: SerperResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;

        let fetched_at = Utc::now();
        let results = body
            .organic
            .into_iter()
            .filter(|r| !r.link.trim().is_empty())
            .take(max_results as usize)
            .enumerate()
            .map(|(i, r)| SearchResult {
                url: r.link,
                title: r.title,
                snippet: r.snippet,
                engine: SearchEngine::Serper,
                query: query.to_string(),
                position: r.position.unwrap_or((i + 1) as u32),
                fetched_at,
            })
            .collect();

        Ok(results)
    }

    async fn health(&self) -> bool {
        self.enabled() && self.api_key().is_ok()
    }
}
