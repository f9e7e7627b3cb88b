//! Task definitions, run outcomes and catalog loading

pub mod catalog;
pub mod categories;
pub mod loader;

pub use catalog::TaskCatalog;
pub use categories::Category;
pub use loader::{load_catalog_from_file, load_catalog_from_string, LoadError};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::analysis::rubric::RubricCriterion;
use crate::models::ModelSpec;
use crate::providers::{CompletionRequest, Message};

/// How a task's response is judged correct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Evaluation {
    /// Trimmed string equality, case-insensitive unless `case_sensitive`
    ExactMatch {
        expected: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    /// Pattern searched anywhere in the response
    Regex { pattern: String },
    /// Embedded JSON validated against a schema, with partial credit
    JsonSchema { schema: serde_json::Value },
    /// Secondary model call producing a 1-5 verdict
    LlmJudge {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
        /// Dimension name -> question put to the judge
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        criteria: IndexMap<String, String>,
    },
    /// Rule-based points per criterion
    Rubric { criteria: Vec<RubricCriterion> },
}

/// Evaluation method tag, without its reference data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMethod {
    ExactMatch,
    Regex,
    JsonSchema,
    LlmJudge,
    Rubric,
}

impl EvaluationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationMethod::ExactMatch => "exact_match",
            EvaluationMethod::Regex => "regex",
            EvaluationMethod::JsonSchema => "json_schema",
            EvaluationMethod::LlmJudge => "llm_judge",
            EvaluationMethod::Rubric => "rubric",
        }
    }
}

impl Evaluation {
    pub fn method(&self) -> EvaluationMethod {
        match self {
            Evaluation::ExactMatch { .. } => EvaluationMethod::ExactMatch,
            Evaluation::Regex { .. } => EvaluationMethod::Regex,
            Evaluation::JsonSchema { .. } => EvaluationMethod::JsonSchema,
            Evaluation::LlmJudge { .. } => EvaluationMethod::LlmJudge,
            Evaluation::Rubric { .. } => EvaluationMethod::Rubric,
        }
    }
}

/// A benchmark task. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub category: Category,
    pub prompt: String,
    pub evaluation: Evaluation,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Earlier conversation turns, sent before `prompt`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,
}

fn default_max_tokens() -> u32 { 1024 }

impl Task {
    pub fn new(
        id: impl Into<String>,
        category: Category,
        prompt: impl Into<String>,
        evaluation: Evaluation,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            prompt: prompt.into(),
            evaluation,
            max_tokens: default_max_tokens(),
            temperature: None,
            system_prompt: None,
            history: Vec::new(),
        }
    }

    /// Exact-match task, case-insensitive
    pub fn exact(id: impl Into<String>, category: Category, prompt: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::new(
            id,
            category,
            prompt,
            Evaluation::ExactMatch {
                expected: expected.into(),
                case_sensitive: false,
            },
        )
    }

    pub fn regex(id: impl Into<String>, category: Category, prompt: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(id, category, prompt, Evaluation::Regex { pattern: pattern.into() })
    }

    pub fn json_schema(id: impl Into<String>, category: Category, prompt: impl Into<String>, schema: serde_json::Value) -> Self {
        Self::new(id, category, prompt, Evaluation::JsonSchema { schema })
    }

    pub fn judged(id: impl Into<String>, category: Category, prompt: impl Into<String>, reference: Option<String>) -> Self {
        Self::new(
            id,
            category,
            prompt,
            Evaluation::LlmJudge {
                reference,
                criteria: IndexMap::new(),
            },
        )
    }

    pub fn method(&self) -> EvaluationMethod {
        self.evaluation.method()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Build the provider request for this task against one model
    pub fn to_request(&self, model: &ModelSpec) -> CompletionRequest {
        let mut messages = self.history.clone();
        messages.push(Message::user(&self.prompt));

        let mut request = CompletionRequest::new(&model.resolved_model_id, messages, self.max_tokens);
        if let Some(temp) = self.temperature {
            request = request.with_temperature(temp);
        }
        if let Some(system) = &self.system_prompt {
            request = request.with_system(system);
        }
        request
    }
}

/// Input/output token counts reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens as u64 + self.output_tokens as u64
    }
}

/// Terminal status of one (task, model) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    ProviderError,
    Timeout,
    RateLimited,
    MalformedResponse,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::ProviderError => "provider_error",
            RunStatus::Timeout => "timeout",
            RunStatus::RateLimited => "rate_limited",
            RunStatus::MalformedResponse => "malformed_response",
        }
    }
}

/// Key tying a record back to its (task, model) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub task_id: String,
    pub model: String,
}

impl PairKey {
    pub fn new(task_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            model: model.into(),
        }
    }
}

/// Raw outcome of one (task, model) execution, after all retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub task_id: String,
    /// Model alias
    pub model: String,
    pub provider: String,
    pub model_id: String,
    pub status: RunStatus,
    /// Present iff `status` is `Success`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    pub latency_ms: u64,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RunResult {
    /// Create a successful result
    pub fn success(
        task_id: impl Into<String>,
        model: &ModelSpec,
        text: String,
        usage: Option<TokenUsage>,
        latency_ms: u64,
        attempt_count: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            model: model.alias.clone(),
            provider: model.resolved_provider.clone(),
            model_id: model.resolved_model_id.clone(),
            status: RunStatus::Success,
            raw_text: Some(text),
            token_usage: usage,
            latency_ms,
            attempt_count,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a failure result
    pub fn failure(
        task_id: impl Into<String>,
        model: &ModelSpec,
        status: RunStatus,
        error: impl Into<String>,
        latency_ms: u64,
        attempt_count: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            model: model.alias.clone(),
            provider: model.resolved_provider.clone(),
            model_id: model.resolved_model_id.clone(),
            status,
            raw_text: None,
            token_usage: None,
            latency_ms,
            attempt_count,
            error_message: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(&self.task_id, &self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Pricing;

    #[test]
    fn test_evaluation_serde_tag() {
        let raw = r#"{"method": "exact_match", "expected": "42"}"#;
        let eval: Evaluation = serde_json::from_str(raw).unwrap();
        assert_eq!(
            eval,
            Evaluation::ExactMatch {
                expected: "42".to_string(),
                case_sensitive: false
            }
        );
        assert_eq!(eval.method(), EvaluationMethod::ExactMatch);
    }

    #[test]
    fn test_request_includes_history_and_system() {
        let task = Task::exact("t1", Category::MultiTurnMemory, "What was my name?", "Ada")
            .with_history(vec![Message::user("My name is Ada."), Message::assistant("Nice to meet you, Ada.")])
            .with_system("Answer with one word.")
            .with_temperature(0.0);
        let model = ModelSpec::new("m", "openai", "gpt-4o", Pricing::Unknown);
        let request = task.to_request(&model);

        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[2].content, "What was my name?");
        assert_eq!(request.system_prompt.as_deref(), Some("Answer with one word."));
        assert_eq!(request.temperature, Some(0.0));
    }

    #[test]
    fn test_run_result_constructors() {
        let model = ModelSpec::new("m", "openai", "gpt-4o", Pricing::Unknown);
        let ok = RunResult::success("t", &model, "hi".into(), None, 10, 1);
        assert!(ok.is_success());
        assert_eq!(ok.key(), PairKey::new("t", "m"));

        let failed = RunResult::failure("t", &model, RunStatus::Timeout, "deadline", 100, 3);
        assert!(failed.raw_text.is_none());
        assert_eq!(failed.attempt_count, 3);
    }
}
