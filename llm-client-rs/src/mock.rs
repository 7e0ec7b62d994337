// llm-client-rs/src/mock.rs
// Deterministic offline model client.
//
// Responses are canned and keyed by a case-insensitive substring match
// against the prompt; the first registered fixture wins. Token usage is
// synthesized as floor(text length / 4).

use async_trait::async_trait;

use crate::{CompletionRequest, CompletionResponse, LlmError, ModelClient, TokenUsage};

pub const MOCK_MODEL_NAME: &str = "mock-model";

const GENERIC_RESPONSE: &str =
    "Acknowledged. No specialized mock fixture matched this prompt; \
     returning a generic completion.";

#[derive(Debug, Clone)]
struct MockFixture {
    pattern: String,
    content: String,
}

#[derive(Debug, Clone, Default)]
pub struct MockModelClient {
    fixtures: Vec<MockFixture>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock with fixtures covering the pipeline's prompt shapes.
    pub fn with_default_fixtures() -> Self {
        Self::new()
            .with_fixture(
                "classify",
                "category: runtime-error\nsubcategory: null-dereference\nseverity: high",
            )
            .with_fixture(
                "propose",
                "Insert a contract guard at the failing boundary and keep the \
                 change scoped to the reported span.",
            )
            .with_fixture(
                "patch",
                "Minimal patch: add a defensive guard before the first use of \
                 the failing value.",
            )
            .with_fixture("commit", "fix: guard runtime fault at reported location")
            .with_fixture(
                "pull request",
                "This change inserts a defensive contract guard for the \
                 captured runtime fault and adds a regression test.",
            )
    }

    /// Register a canned response. Fixtures match in registration order.
    pub fn with_fixture(mut self, pattern: impl Into<String>, content: impl Into<String>) -> Self {
        self.fixtures.push(MockFixture {
            pattern: pattern.into(),
            content: content.into(),
        });
        self
    }

    fn lookup(&self, prompt: &str) -> &str {
        let needle = prompt.to_ascii_lowercase();
        for fixture in &self.fixtures {
            if needle.contains(&fixture.pattern.to_ascii_lowercase()) {
                return &fixture.content;
            }
        }
        GENERIC_RESPONSE
    }

    fn estimate_usage(prompt: &str, content: &str) -> TokenUsage {
        let prompt_tokens = (prompt.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32;
        TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let content = self.lookup(&request.prompt).to_string();
        let usage = Self::estimate_usage(&request.prompt, &content);

        Ok(CompletionResponse {
            content,
            model: MOCK_MODEL_NAME.to_string(),
            usage: Some(usage),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn available_models(&self) -> Vec<String> {
        vec![MOCK_MODEL_NAME.to_string()]
    }
}
