//! Provider trait definitions for LLM API clients

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tasks::TokenUsage;

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Request for a completion from an LLM provider
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            temperature: None,
            system_prompt: None,
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    /// Absent when the provider omits usage accounting
    pub usage: Option<TokenUsage>,
    pub finish_reason: String,
}

/// Failure classes shared by every provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Auth,
    RateLimit,
    ServerError,
    Malformed,
    Timeout,
    InvalidRequest,
    ContentPolicy,
}

impl FailureKind {
    /// Transient failures are retried with backoff
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            FailureKind::RateLimit | FailureKind::ServerError | FailureKind::Timeout
        )
    }
}

/// Error types for provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication error ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Invalid request: {status} - {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("Content policy rejection: {0}")]
    ContentPolicy(String),

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Map this error onto the shared failure taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::Http(e) if e.is_timeout() => FailureKind::Timeout,
            ProviderError::Http(e) if e.is_decode() => FailureKind::Malformed,
            ProviderError::Http(e) if e.is_builder() => FailureKind::InvalidRequest,
            ProviderError::Http(_) => FailureKind::ServerError,
            ProviderError::Auth { .. } => FailureKind::Auth,
            ProviderError::RateLimited { .. } => FailureKind::RateLimit,
            ProviderError::Server { .. } => FailureKind::ServerError,
            ProviderError::InvalidRequest { .. } => FailureKind::InvalidRequest,
            ProviderError::ContentPolicy(_) => FailureKind::ContentPolicy,
            ProviderError::Timeout { .. } => FailureKind::Timeout,
            ProviderError::Malformed(_) => FailureKind::Malformed,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Server-requested delay before the next attempt
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }

    /// Classify a non-success HTTP status and its error message
    pub fn from_status(status: u16, message: String, retry_after_ms: Option<u64>) -> Self {
        let lowered = message.to_lowercase();
        match status {
            401 | 403 => ProviderError::Auth { status, message },
            429 if lowered.contains("quota") || lowered.contains("insufficient") => {
                ProviderError::Auth { status, message }
            }
            429 => ProviderError::RateLimited { retry_after_ms },
            408 | 504 => ProviderError::Timeout { timeout_ms: 0 },
            500..=599 => ProviderError::Server { status, message },
            _ if is_content_policy(&lowered) => ProviderError::ContentPolicy(message),
            _ => ProviderError::InvalidRequest { status, message },
        }
    }
}

fn is_content_policy(lowered: &str) -> bool {
    ["content policy", "content_policy", "content_filter", "safety"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Parse a `retry-after` header value (seconds) into milliseconds
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| (secs * 1000.0) as u64)
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Get the provider id (e.g., "anthropic", "openai", "openrouter")
    fn name(&self) -> &str;

    /// Send a completion request
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ProviderError::from_status(401, "bad key".into(), None).kind(), FailureKind::Auth);
        assert_eq!(
            ProviderError::from_status(429, "slow down".into(), Some(2000)).kind(),
            FailureKind::RateLimit
        );
        assert_eq!(
            ProviderError::from_status(429, "You exceeded your current quota".into(), None).kind(),
            FailureKind::Auth
        );
        assert_eq!(ProviderError::from_status(503, "overloaded".into(), None).kind(), FailureKind::ServerError);
        assert_eq!(
            ProviderError::from_status(400, "blocked by content policy".into(), None).kind(),
            FailureKind::ContentPolicy
        );
        assert_eq!(
            ProviderError::from_status(400, "max_tokens too large".into(), None).kind(),
            FailureKind::InvalidRequest
        );
    }

    #[test]
    fn test_transient_kinds() {
        assert!(FailureKind::RateLimit.is_transient());
        assert!(FailureKind::ServerError.is_transient());
        assert!(FailureKind::Timeout.is_transient());
        assert!(!FailureKind::Auth.is_transient());
        assert!(!FailureKind::Malformed.is_transient());
        assert!(!FailureKind::ContentPolicy.is_transient());
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "1.5".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(1500));
        assert_eq!(parse_retry_after(&reqwest::header::HeaderMap::new()), None);
    }
}
