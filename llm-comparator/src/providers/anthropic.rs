//! Anthropic (Claude) Messages API client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::traits::{
    parse_retry_after, CompletionRequest, CompletionResponse, LLMProvider, Message, ProviderError,
    ProviderResult,
};
use crate::tasks::TokenUsage;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    http_client: Client,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http_client: Client::new(),
        }
    }

    /// Create from environment variable
    pub fn from_env() -> Option<Self> {
        std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(Self::new)
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-attempt HTTP timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

impl From<&Message> for AnthropicMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.clone(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type", default)]
    error_type: String,
}

fn build_request(request: &CompletionRequest) -> AnthropicRequest {
    // System turns travel in the top-level `system` field
    let system = request.system_prompt.clone().or_else(|| {
        request
            .messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.clone())
    });

    AnthropicRequest {
        model: request.model.clone(),
        max_tokens: request.max_tokens,
        messages: request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| m.into())
            .collect(),
        system,
        temperature: request.temperature,
    }
}

fn extract_text(response: &AnthropicResponse) -> String {
    response
        .content
        .iter()
        .filter(|block| block.content_type == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl LLMProvider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        let body = build_request(request);

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<AnthropicError>(&text) {
                Ok(err) if err.error.error_type == "overloaded_error" => {
                    return Err(ProviderError::Server {
                        status: status.as_u16(),
                        message: err.error.message,
                    });
                }
                Ok(err) => err.error.message,
                Err(_) => text,
            };
            return Err(ProviderError::from_status(status.as_u16(), message, retry_after_ms));
        }

        let text = response.text().await?;
        let api_response: AnthropicResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Malformed(format!("anthropic response: {}", e)))?;

        Ok(CompletionResponse {
            content: extract_text(&api_response),
            model: api_response.model,
            usage: api_response
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
            finish_reason: api_response
                .stop_reason
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}
