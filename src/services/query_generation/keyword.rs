//! Keyword-style query strategy.
//!
//! For classical search engines: short keyword phrases tuned for
//! ranking, typically under ten words each.

use std::sync::Arc;

use async_trait::async_trait;

use super::llm_client::ChatCompletionClient;
use super::parser::parse_query_lines;
use super::{GenerationError, QueryStrategy, describe_request};
use crate::config::GenerationConfig;
use crate::models::{QueryKind, QueryRequest};

pub struct KeywordQueryStrategy {
    client: Arc<ChatCompletionClient>,
    config: GenerationConfig,
}

impl KeywordQueryStrategy {
    pub fn new(client: Arc<ChatCompletionClient>, config: GenerationConfig) -> Self {
        Self { client, config }
    }
}

const SYSTEM_PROMPT: &str = "You write web search queries for a funding-discovery crawler. \
Produce short keyword phrases (under 10 words), one per line, without numbering, \
quotes, or commentary. Favor terms a grant-making organization would use on its own site.";

#[async_trait]
impl QueryStrategy for KeywordQueryStrategy {
    fn kind(&self) -> QueryKind {
        QueryKind::Keyword
    }

    async fn generate(&self, request: &QueryRequest) -> Result<Vec<String>, GenerationError> {
        let description = describe_request(request, &self.config);
        let user_prompt = format!(
            "Generate {} distinct keyword search queries to find funding sources \
             (grants, scholarships, fellowships, program funds) for {}.",
            request.count, description,
        );

        let completion = self.client.complete(SYSTEM_PROMPT, &user_prompt).await?;
        Ok(parse_query_lines(&completion, request.count as usize))
    }
}
