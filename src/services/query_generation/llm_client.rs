//! Chat-completion client for query generation.
//!
//! Talks to an OpenAI-compatible endpoint (a local model server in the
//! default deployment). The transport is pinned to HTTP/1.1: the local
//! chat endpoint does not negotiate HTTP/2 correctly and returns
//! intermittent stream errors when allowed to.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::GenerationError;
use crate::config::LanguageModelConfig;

pub struct ChatCompletionClient {
    http_client: Client,
    config: LanguageModelConfig,
}

impl ChatCompletionClient {
    pub fn new(config: LanguageModelConfig) -> Self {
        let http_client = Client::builder()
            .http1_only()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create LM HTTP client");

        Self { http_client, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// One chat completion; returns the raw assistant text.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system_prompt.to_string() },
                ChatMessage { role: "user".to_string(), content: user_prompt.to_string() },
            ],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        };

        tracing::debug!("Calling LM {} with model {}", url, self.config.model);

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.config.timeout_secs)
                } else {
                    GenerationError::ModelUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::ModelUnavailable(format!(
                "LM error {}: {}",
                status, error_text
            )));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::ParseError(e.to_string()))?;

        body.choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GenerationError::ParseError("empty completion".to_string()))
    }

    /// `/models` reachability probe.
    pub async fn health(&self) -> bool {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        self.http_client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

// ============================================================================
// OpenAI API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
