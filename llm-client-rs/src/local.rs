// llm-client-rs/src/local.rs
// Provider for local OpenAI-compatible inference servers
// (Ollama, LM Studio). No credential is required.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::Client;

use config_rs::ConfigSource;

use crate::chat::{build_chat_body, execute_chat};
use crate::{CompletionRequest, CompletionResponse, LlmError, ModelClient};

const DEFAULT_LOCAL_URL: &str = "http://localhost:11434/v1/chat/completions";
const DEFAULT_LOCAL_MODEL: &str = "llama3.1";

#[derive(Debug)]
pub struct LocalServerClient {
    api_url: String,
    model: String,
    transport: OnceCell<Client>,
}

impl LocalServerClient {
    pub fn new(config: &dyn ConfigSource) -> Result<Self, LlmError> {
        let api_url = config.get("LLM_API_URL", DEFAULT_LOCAL_URL);
        let model = config.get("LLM_MODEL", DEFAULT_LOCAL_MODEL);

        log::info!("local model client configured at {} (model: {})", api_url, model);

        Ok(Self {
            api_url,
            model,
            transport: OnceCell::new(),
        })
    }

    fn transport(&self) -> &Client {
        self.transport.get_or_init(|| {
            Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default()
        })
    }
}

#[async_trait]
impl ModelClient for LocalServerClient {
    // No retry loop here: a local server that refuses connections is a
    // setup problem, and failing fast keeps the feedback tight.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = build_chat_body(request);
        execute_chat(self.transport(), &self.api_url, None, &body).await
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn available_models(&self) -> Vec<String> {
        vec![self.model.clone()]
    }
}
