// llm-client-rs/src/hosted.rs
// Hosted OpenAI-compatible provider with exponential backoff retries.

use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use once_cell::sync::OnceCell;
use rand::Rng;
use reqwest::Client;

use config_rs::{get_parsed, ConfigSource};

use crate::chat::{build_chat_body, execute_chat};
use crate::{CompletionRequest, CompletionResponse, LlmError, ModelClient, DEFAULT_API_URL, DEFAULT_MODEL};

// Credential values that indicate a template was copied without editing.
const PLACEHOLDER_CREDENTIALS: &[&str] = &["changeme", "your-api-key", "your-api-key-here", "sk-xxx"];

#[derive(Debug)]
pub struct HostedApiClient {
    api_url: String,
    api_key: String,
    model: String,
    provider: String,
    max_retries: u32,
    initial_retry_delay_ms: u64,
    max_retry_delay_ms: u64,
    // Transport is built on first use so a broken TLS/proxy environment
    // surfaces when a request is actually made, not at construction.
    transport: OnceCell<Client>,
}

impl HostedApiClient {
    /// Construct a hosted provider from configuration.
    ///
    /// Fails fast with `CredentialMissing` when the API key is absent,
    /// empty, or a known placeholder value.
    pub fn new(config: &dyn ConfigSource) -> Result<Self, LlmError> {
        let api_key = config
            .get_required("LLM_API_KEY")
            .map_err(|_| LlmError::CredentialMissing("LLM_API_KEY is not set".to_string()))?;

        let trimmed = api_key.trim();
        if PLACEHOLDER_CREDENTIALS
            .iter()
            .any(|p| trimmed.eq_ignore_ascii_case(p))
        {
            return Err(LlmError::CredentialMissing(format!(
                "LLM_API_KEY holds the placeholder value '{}'",
                trimmed
            )));
        }

        let api_url = config.get("LLM_API_URL", DEFAULT_API_URL);
        let model = config.get("LLM_MODEL", DEFAULT_MODEL);
        let provider = determine_provider(&api_url, &model);

        let max_retries = get_parsed(config, "LLM_MAX_RETRIES", 3u32);
        let initial_retry_delay_ms = get_parsed(config, "LLM_INITIAL_RETRY_DELAY_MS", 1000u64);
        let max_retry_delay_ms = get_parsed(config, "LLM_MAX_RETRY_DELAY_MS", 30000u64);

        log::info!(
            "hosted model client configured for provider {} (model: {})",
            provider,
            model
        );

        Ok(Self {
            api_url,
            api_key: trimmed.to_string(),
            model,
            provider,
            max_retries,
            initial_retry_delay_ms,
            max_retry_delay_ms,
            transport: OnceCell::new(),
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    fn transport(&self) -> &Client {
        self.transport.get_or_init(|| {
            Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default()
        })
    }

    /// Exponential backoff with jitter, capped at 2 minutes total.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_retry_delay_ms))
            .with_max_interval(Duration::from_millis(self.max_retry_delay_ms))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(120)))
            .with_randomization_factor(0.5)
            .build()
    }
}

#[async_trait]
impl ModelClient for HostedApiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = build_chat_body(request);
        let mut backoff = self.create_backoff();
        let mut attempt = 0u32;

        log::info!(
            "Preparing LLM request to {} (model: {})",
            self.api_url,
            body.model
        );

        loop {
            attempt += 1;

            if attempt > 1 {
                log::info!("Retry attempt {} for LLM request", attempt);
            }

            match execute_chat(self.transport(), &self.api_url, Some(&self.api_key), &body).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !err.is_retryable() || attempt > self.max_retries {
                        log::error!("LLM request failed after {} attempts: {}", attempt, err);
                        return Err(err);
                    }

                    if let Some(backoff_duration) = backoff.next_backoff() {
                        log::warn!("Retryable error: {}. Retrying in {:?}", err, backoff_duration);

                        // Small extra jitter so concurrent clients do not
                        // retry in lockstep.
                        let jitter = rand::thread_rng().gen_range(0..=200);
                        let jittered = backoff_duration + Duration::from_millis(jitter);
                        tokio::time::sleep(jittered).await;
                    } else {
                        log::error!("Exceeded maximum backoff time: {}", err);
                        return Err(err);
                    }
                }
            }
        }
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn available_models(&self) -> Vec<String> {
        vec![self.model.clone()]
    }
}

/// Determine the provider name from the API URL or model identifier.
pub(crate) fn determine_provider(api_url: &str, model: &str) -> String {
    if api_url.contains("openai.com") {
        "openai".to_string()
    } else if api_url.contains("openrouter.ai") {
        "openrouter".to_string()
    } else if api_url.contains("x.ai") {
        "grok".to_string()
    } else if api_url.contains("googleapis.com") {
        "gemini".to_string()
    } else if model.starts_with("anthropic/") {
        "anthropic".to_string()
    } else {
        "default".to_string()
    }
}
