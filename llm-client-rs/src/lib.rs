// llm-client-rs/src/lib.rs
//
// Pluggable model-client abstraction over text-completion backends.
//
// This crate provides:
// - One capability trait (`ModelClient`) shared by every provider
// - A hosted OpenAI-compatible HTTP provider with retry/backoff
// - A local inference-server provider (Ollama / LM Studio style)
// - A deterministic mock provider for offline and test runs
// - A factory that degrades to the mock instead of failing hard
//
// Configuration (via config-rs):
// - LLM_API_KEY: API key for the hosted provider
// - LLM_API_URL: API endpoint URL (defaults to OpenAI compatible endpoint)
// - LLM_MODEL: Model to use (e.g. "gpt-4o-mini")
// - LLM_MAX_RETRIES: Maximum number of retry attempts (default: 3)
// - LLM_INITIAL_RETRY_DELAY_MS: Initial delay between retries in ms (default: 1000)
// - LLM_MAX_RETRY_DELAY_MS: Maximum delay between retries in ms (default: 30000)

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use config_rs::ConfigSource;

mod chat;
mod hosted;
mod local;
mod mock;


pub use hosted::HostedApiClient;
pub use local::LocalServerClient;
pub use mock::MockModelClient;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// A single text-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Token accounting reported by a provider, when available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A completed model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

// Error type for model-client operations.
// The split between retryable and non-retryable variants drives the
// hosted provider's backoff loop.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    // Non-retryable: client-side errors that won't be fixed by retrying
    #[error("credential not configured: {0}")]
    CredentialMissing(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("model not available: {0}")]
    ModelNotAvailable(String),

    // Retryable with increasing delays
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    // Other
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl LlmError {
    /// Whether the retry loop should attempt this request again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::ServerError(_) | LlmError::NetworkError(_) | LlmError::RateLimited(_)
        )
    }
}

/// Uniform contract over text-completion backends.
///
/// Providers are swapped behind this trait; callers never depend on a
/// concrete implementation.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Whether the provider has everything it needs to serve requests.
    fn is_configured(&self) -> bool;

    fn available_models(&self) -> Vec<String>;
}

fn is_local_endpoint(api_url: &str) -> bool {
    api_url.contains("localhost:11434")
        || api_url.contains("localhost:1234")
        || api_url.contains("127.0.0.1")
}

/// Build a model client from configuration.
///
/// `use_mock` forces the deterministic mock. Otherwise the configured API
/// URL selects a hosted or local provider; if constructing the real client
/// fails for any reason the factory logs a warning and falls back to the
/// mock client rather than propagating the error. Degraded but running
/// beats hard failure at this boundary.
pub async fn create_model_client(
    config: &dyn ConfigSource,
    use_mock: bool,
) -> Arc<dyn ModelClient> {
    if use_mock {
        log::info!("model client factory: using deterministic mock client");
        return Arc::new(MockModelClient::with_default_fixtures());
    }

    let api_url = config.get("LLM_API_URL", DEFAULT_API_URL);

    if is_local_endpoint(&api_url) {
        match LocalServerClient::new(config) {
            Ok(client) => {
                log::info!("model client factory: using local inference server at {}", api_url);
                return Arc::new(client);
            }
            Err(err) => {
                log::warn!(
                    "Failed to construct local model client: {}. Falling back to mock client.",
                    err
                );
                return Arc::new(MockModelClient::with_default_fixtures());
            }
        }
    }

    match HostedApiClient::new(config) {
        Ok(client) => {
            log::info!("model client factory: using hosted provider at {}", api_url);
            Arc::new(client)
        }
        Err(err) => {
            log::warn!(
                "Failed to construct hosted model client: {}. Falling back to mock client.",
                err
            );
            Arc::new(MockModelClient::with_default_fixtures())
        }
    }
}
