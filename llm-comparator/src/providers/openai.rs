//! OpenAI-compatible chat completions client
//!
//! Serves OpenAI itself plus every provider exposing the same wire format:
//! the OpenRouter gateway, Google's compatibility endpoint and ZhipuAI.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::traits::{
    parse_retry_after, CompletionRequest, CompletionResponse, LLMProvider, Message, ProviderError,
    ProviderResult,
};
use crate::tasks::TokenUsage;

const OPENROUTER_REFERER: &str = "https://github.com/llm-comparator/llm-comparator";
const OPENROUTER_TITLE: &str = "LLM Comparator";

/// Known OpenAI-compatible endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    OpenAI,
    OpenRouter,
    Google,
    ZhipuAI,
}

impl Preset {
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "openai" => Some(Preset::OpenAI),
            "openrouter" => Some(Preset::OpenRouter),
            "google" | "gemini" => Some(Preset::Google),
            "zhipuai" | "zhipu" => Some(Preset::ZhipuAI),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Preset::OpenAI => "openai",
            Preset::OpenRouter => "openrouter",
            Preset::Google => "google",
            Preset::ZhipuAI => "zhipuai",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Preset::OpenAI => "https://api.openai.com/v1",
            Preset::OpenRouter => "https://openrouter.ai/api/v1",
            Preset::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
            Preset::ZhipuAI => "https://open.bigmodel.cn/api/paas/v4",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Preset::OpenAI => "OPENAI_API_KEY",
            Preset::OpenRouter => "OPENROUTER_API_KEY",
            Preset::Google => "GOOGLE_API_KEY",
            Preset::ZhipuAI => "ZHIPU_API_KEY",
        }
    }
}

/// OpenAI-compatible API client
pub struct OpenAIClient {
    name: String,
    preset: Preset,
    api_key: String,
    base_url: String,
    http_client: Client,
}

impl OpenAIClient {
    /// Create a client for the OpenAI API
    pub fn new(api_key: String) -> Self {
        Self::for_preset(Preset::OpenAI, api_key)
    }

    /// Create a client for one of the known compatible endpoints
    pub fn for_preset(preset: Preset, api_key: String) -> Self {
        Self {
            name: preset.id().to_string(),
            preset,
            api_key,
            base_url: preset.base_url().to_string(),
            http_client: Client::new(),
        }
    }

    /// Create from the preset's environment variable
    pub fn from_env(preset: Preset) -> Option<Self> {
        std::env::var(preset.api_key_env())
            .ok()
            .filter(|k| !k.is_empty())
            .map(|key| Self::for_preset(preset, key))
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the provider id reported by `name()`
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
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
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    /// For standard models
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// For reasoning models (o1, o3, gpt-5)
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl From<&Message> for OpenAIMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.clone(),
            content: Some(msg.content.clone()),
        }
    }
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: String,
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Bare model name, without any `vendor/` routing prefix
fn base_model(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}

fn build_request(request: &CompletionRequest) -> OpenAIRequest {
    let mut messages: Vec<OpenAIMessage> = Vec::new();
    if let Some(system) = &request.system_prompt {
        messages.push(OpenAIMessage {
            role: "system".to_string(),
            content: Some(system.clone()),
        });
    }
    messages.extend(request.messages.iter().map(OpenAIMessage::from));

    let bare = base_model(&request.model);
    let is_reasoning = bare.starts_with("o1") || bare.starts_with("o3") || bare.starts_with("o4");
    let uses_completion_tokens = is_reasoning || bare.starts_with("gpt-5");

    if uses_completion_tokens {
        OpenAIRequest {
            model: request.model.clone(),
            messages,
            max_tokens: None,
            max_completion_tokens: Some(request.max_tokens),
            temperature: if is_reasoning { None } else { request.temperature },
        }
    } else {
        OpenAIRequest {
            model: request.model.clone(),
            messages,
            max_tokens: Some(request.max_tokens),
            max_completion_tokens: None,
            temperature: request.temperature,
        }
    }
}

fn error_message(text: String) -> String {
    match serde_json::from_str::<OpenAIError>(&text) {
        Ok(err) => match err.error.code {
            Some(code) if !code.is_null() => format!("{} ({})", err.error.message, code),
            _ => err.error.message,
        },
        Err(_) => text,
    }
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        let body = build_request(request);

        let mut builder = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if self.preset == Preset::OpenRouter {
            builder = builder
                .header("HTTP-Referer", OPENROUTER_REFERER)
                .header("X-Title", OPENROUTER_TITLE);
        }

        let response = builder.json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                error_message(text),
                retry_after_ms,
            ));
        }

        let text = response.text().await?;
        let api_response: OpenAIResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Malformed(format!("{} response: {}", self.name, e)))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("no choices in response".to_string()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ProviderError::ContentPolicy(
                "response withheld by content filter".to_string(),
            ));
        }

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            model: api_response.model,
            usage: api_response
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup() {
        assert_eq!(Preset::from_id("OpenRouter"), Some(Preset::OpenRouter));
        assert_eq!(Preset::from_id("gemini"), Some(Preset::Google));
        assert_eq!(Preset::from_id("anthropic"), None);
        assert_eq!(Preset::ZhipuAI.api_key_env(), "ZHIPU_API_KEY");
    }

    #[test]
    fn test_reasoning_models_use_completion_tokens() {
        let request = CompletionRequest::new("openai/o3-mini", vec![Message::user("hi")], 100)
            .with_temperature(0.2);
        let body = build_request(&request);
        assert_eq!(body.max_completion_tokens, Some(100));
        assert!(body.max_tokens.is_none());
        assert!(body.temperature.is_none());

        let request = CompletionRequest::new("gpt-4o", vec![Message::user("hi")], 100)
            .with_system("sys")
            .with_temperature(0.2);
        let body = build_request(&request);
        assert_eq!(body.max_tokens, Some(100));
        assert_eq!(body.temperature, Some(0.2));
        assert_eq!(body.messages[0].role, "system");
    }

    #[test]
    fn test_error_message_extraction() {
        let raw = r#"{"error": {"message": "You exceeded your current quota", "code": "insufficient_quota"}}"#;
        let msg = error_message(raw.to_string());
        assert!(msg.contains("quota"));
        let err = ProviderError::from_status(429, msg, None);
        assert!(!err.is_transient());

        assert_eq!(error_message("plain text".to_string()), "plain text");
    }

    #[test]
    fn test_usage_is_optional() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}]}"#;
        let parsed: OpenAIResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("ok"));
    }
}
