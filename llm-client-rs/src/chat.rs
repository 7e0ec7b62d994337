// llm-client-rs/src/chat.rs
// OpenAI-compatible chat-completions wire types and the shared request
// execution path used by the hosted and local providers.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{CompletionRequest, CompletionResponse, LlmError, TokenUsage};

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Translate a completion request into the chat wire format.
pub(crate) fn build_chat_body(request: &CompletionRequest) -> ChatCompletionRequest {
    let mut messages = Vec::new();

    if let Some(system_prompt) = &request.system_prompt {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system_prompt.clone(),
        });
    }

    messages.push(ChatMessage {
        role: "user".to_string(),
        content: request.prompt.clone(),
    });

    ChatCompletionRequest {
        model: request.model.clone(),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

/// Execute a single chat-completions request attempt.
///
/// Status-code handling mirrors the provider contract: 4xx are invalid
/// requests, 429 is rate limiting, 5xx are retryable server errors.
pub(crate) async fn execute_chat(
    transport: &Client,
    api_url: &str,
    api_key: Option<&str>,
    body: &ChatCompletionRequest,
) -> Result<CompletionResponse, LlmError> {
    let mut builder = transport
        .post(api_url)
        .header("Content-Type", "application/json")
        .json(body);

    if let Some(key) = api_key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }

    let response = match builder.send().await {
        Ok(resp) => resp,
        Err(err) => {
            if err.is_timeout() {
                return Err(LlmError::NetworkError(format!("Request timed out: {}", err)));
            } else if err.is_connect() {
                return Err(LlmError::NetworkError(format!("Connection failed: {}", err)));
            } else {
                return Err(LlmError::NetworkError(format!("Network error: {}", err)));
            }
        }
    };

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();

        return match status.as_u16() {
            400 => Err(LlmError::InvalidRequest(format!("Bad request: {}", text))),
            401 => Err(LlmError::InvalidRequest(format!("Unauthorized: {}", text))),
            403 => Err(LlmError::InvalidRequest(format!("Forbidden: {}", text))),
            404 => Err(LlmError::ModelNotAvailable(format!("Not found: {}", text))),
            429 => Err(LlmError::RateLimited(format!("Rate limit exceeded: {}", text))),
            // Server errors - retryable
            500 | 502 | 503 | 504 => Err(LlmError::ServerError(format!(
                "Server error ({}): {}",
                status, text
            ))),
            _ => Err(LlmError::Unknown(format!(
                "Unknown error ({}): {}",
                status, text
            ))),
        };
    }

    let data: ChatCompletionResponse = response
        .json()
        .await
        .map_err(|err| LlmError::ParseError(format!("Failed to parse response: {}", err)))?;

    let choice = data
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ParseError("No choices returned in response".to_string()))?;

    if let Some(usage) = &data.usage {
        log::info!("LLM request completed. Used {} tokens", usage.total_tokens);
    }

    Ok(CompletionResponse {
        content: choice.message.content,
        model: data.model.unwrap_or_else(|| body.model.clone()),
        usage: data.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        finish_reason: choice.finish_reason,
    })
}
