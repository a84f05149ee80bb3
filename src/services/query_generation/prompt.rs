//! Prompt-style query strategy.
//!
//! For AI-augmented engines: full-sentence questions (15-40 words)
//! carrying positive criteria and optional exclusions.

use std::sync::Arc;

use async_trait::async_trait;

use super::llm_client::ChatCompletionClient;
use super::parser::parse_query_lines;
use super::{GenerationError, QueryStrategy, describe_request};
use crate::config::GenerationConfig;
use crate::models::{QueryKind, QueryRequest};

pub struct PromptQueryStrategy {
    client: Arc<ChatCompletionClient>,
    config: GenerationConfig,
}

impl PromptQueryStrategy {
    pub fn new(client: Arc<ChatCompletionClient>, config: GenerationConfig) -> Self {
        Self { client, config }
    }
}

const SYSTEM_PROMPT: &str = "You write questions for an AI-augmented search engine hunting \
for funding sources. Produce full-sentence questions of 15 to 40 words, one per line, \
without numbering or commentary. State what qualifies (open calls, named programs, \
eligibility) and exclude aggregator listicles and expired deadlines.";

#[async_trait]
impl QueryStrategy for PromptQueryStrategy {
    fn kind(&self) -> QueryKind {
        QueryKind::Prompt
    }

    async fn generate(&self, request: &QueryRequest) -> Result<Vec<String>, GenerationError> {
        let description = describe_request(request, &self.config);
        let user_prompt = format!(
            "Write {} distinct questions that would surface currently open funding \
             opportunities (grants, scholarships, fellowships, program funds) for {}. \
             Each question must stand alone.",
            request.count, description,
        );

        let completion = self.client.complete(SYSTEM_PROMPT, &user_prompt).await?;
        Ok(parse_query_lines(&completion, request.count as usize))
    }
}
