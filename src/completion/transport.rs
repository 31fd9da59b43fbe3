use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::types::{ChatRequest, ChatResponse, Message, TokenUsage};
use crate::config::{ProviderConfig, RequestConfig};
use crate::error::{CompletionError, CompletionResult};

/// One request/response exchange with a chat model.
///
/// Implementations perform a single attempt; retry lives in the client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> CompletionResult<ChatResponse>;
}

/// Transport for OpenAI-compatible `/chat/completions` endpoints (OpenAI, OpenRouter)
#[derive(Clone)]
pub struct OpenAiTransport {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiTransport {
    /// Create a transport; fails before any call when the credential is unusable
    pub fn new(provider: &ProviderConfig, request: &RequestConfig) -> CompletionResult<Self> {
        if provider.api_key.trim().is_empty() {
            return Err(CompletionError::Configuration {
                message: format!("Empty API key for provider {}", provider.provider.as_str()),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(request.timeout_ms))
            .build()
            .map_err(|e| CompletionError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            api_key: provider.api_key.clone(),
            timeout_ms: request.timeout_ms,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn chat(&self, request: &ChatRequest) -> CompletionResult<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %request.options.model,
            messages = request.messages.len(),
            json_mode = request.json_mode,
            "Calling chat completions"
        );

        let body = ChatApiRequest {
            model: &request.options.model,
            messages: &request.messages,
            temperature: request.options.temperature,
            top_p: request.options.top_p,
            max_tokens: request.options.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    CompletionError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let api_response: ChatApiResponse =
            response
                .json()
                .await
                .map_err(|e| CompletionError::MalformedResponse {
                    message: format!("Failed to parse response envelope: {}", e),
                })?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| CompletionError::MalformedResponse {
                message: "Response contained no message content".to_string(),
            })?;

        Ok(ChatResponse {
            content,
            usage: api_response.usage.unwrap_or_default(),
        })
    }
}
