//! Scoring: (Task, RunResult) -> ScoreRecord

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::cost::compute_cost;
use super::judge::{judge_response, CompletionChannel, JudgeSettings, JUDGE_UNAVAILABLE};
use super::rubric::evaluate_rubric;
use super::schema::{extract_json_span, schema_score, SchemaWeights};
use crate::models::{ModelSpec, Pricing};
use crate::tasks::{Category, Evaluation, EvaluationMethod, PairKey, RunResult, RunStatus, Task};

/// Diagnostic when a regex reference does not compile
pub const INVALID_PATTERN: &str = "invalid-pattern";
/// Diagnostic when a schema reference does not compile
pub const INVALID_SCHEMA: &str = "invalid-schema";
/// Diagnostic when no JSON could be extracted from the response
pub const UNPARSEABLE_JSON: &str = "unparseable-json";

/// Scored outcome of one (task, model) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub task_id: String,
    /// Model alias
    pub model: String,
    pub provider: String,
    pub category: Category,
    pub method: EvaluationMethod,
    pub status: RunStatus,
    /// 0.0 - 1.0; failures score 0.0
    pub correctness: f64,
    pub cost_usd: f64,
    /// False when usage or pricing was unknown and `cost_usd` defaulted to 0.0
    pub cost_estimated: bool,
    pub latency_ms: u64,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    /// Judge justification; empty for every other method
    #[serde(default)]
    pub judge_rationale: String,
    /// Judge calls made while scoring this pair
    #[serde(default)]
    pub judge_calls: u32,
    /// Spend on those judge calls, kept apart from the candidate's `cost_usd`
    #[serde(default)]
    pub judge_cost_usd: f64,
    /// Scoring notes: rubric breakdown or a fallback marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ScoreRecord {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(&self.task_id, &self.model)
    }
}

/// Correctness plus its explanation, before cost/latency are attached
#[derive(Debug, Clone, PartialEq)]
struct Evaluated {
    correctness: f64,
    judge_rationale: String,
    diagnostic: Option<String>,
    judge_calls: u32,
    judge_cost_usd: f64,
}

impl Evaluated {
    fn score(correctness: f64) -> Self {
        Self {
            correctness,
            judge_rationale: String::new(),
            diagnostic: None,
            judge_calls: 0,
            judge_cost_usd: 0.0,
        }
    }

    fn unjudged(rationale: impl Into<String>) -> Self {
        Self {
            judge_rationale: rationale.into(),
            ..Self::score(0.0)
        }
    }

    fn fallback(marker: impl Into<String>) -> Self {
        Self {
            diagnostic: Some(marker.into()),
            ..Self::score(0.0)
        }
    }
}

/// Judge wiring: the channel to call through and the judge model
#[derive(Clone)]
pub struct JudgeHandle {
    pub channel: Arc<dyn CompletionChannel>,
    pub settings: JudgeSettings,
}

/// Maps run results to score records
#[derive(Clone)]
pub struct Scorer {
    pricing: HashMap<String, Pricing>,
    cost_precision: u32,
    schema_weights: SchemaWeights,
    judge: Option<JudgeHandle>,
}

impl Scorer {
    pub fn new(models: &[ModelSpec], cost_precision: u32) -> Self {
        Self {
            pricing: models
                .iter()
                .map(|m| (m.alias.clone(), m.pricing))
                .collect(),
            cost_precision,
            schema_weights: SchemaWeights::default(),
            judge: None,
        }
    }

    pub fn with_schema_weights(mut self, weights: SchemaWeights) -> Self {
        self.schema_weights = weights;
        self
    }

    pub fn with_judge(mut self, channel: Arc<dyn CompletionChannel>, settings: JudgeSettings) -> Self {
        self.judge = Some(JudgeHandle { channel, settings });
        self
    }

    /// Score one pair. Never fails: scoring problems degrade to 0.0.
    pub async fn score(&self, task: &Task, result: &RunResult) -> ScoreRecord {
        let evaluated = match (&task.evaluation, result.raw_text.as_deref()) {
            (_, None) => Evaluated::score(0.0),
            _ if !result.is_success() => Evaluated::score(0.0),
            (Evaluation::LlmJudge { reference, criteria }, Some(text)) => match &self.judge {
                Some(judge) => {
                    let outcome = judge_response(
                        judge.channel.as_ref(),
                        &judge.settings,
                        task,
                        text,
                        reference.as_deref(),
                        criteria,
                    )
                    .await;
                    let judge_cost = compute_cost(
                        outcome.usage.as_ref(),
                        &judge.settings.model.pricing,
                        self.cost_precision,
                    );
                    Evaluated {
                        correctness: outcome.correctness,
                        judge_rationale: outcome.rationale,
                        diagnostic: None,
                        judge_calls: outcome.calls,
                        judge_cost_usd: judge_cost.cost_usd,
                    }
                }
                None => Evaluated::unjudged(format!("{}: no judge configured", JUDGE_UNAVAILABLE)),
            },
            (_, Some(text)) => self.evaluate_offline(&task.evaluation, text),
        };
        self.finish(task, result, evaluated)
    }

    /// Score without any network access. Judge tasks fall back to 0.0.
    pub fn score_offline(&self, task: &Task, result: &RunResult) -> ScoreRecord {
        let evaluated = match result.raw_text.as_deref() {
            Some(text) if result.is_success() => match &task.evaluation {
                Evaluation::LlmJudge { .. } => {
                    Evaluated::unjudged(format!("{}: offline scoring", JUDGE_UNAVAILABLE))
                }
                evaluation => self.evaluate_offline(evaluation, text),
            },
            _ => Evaluated::score(0.0),
        };
        self.finish(task, result, evaluated)
    }

    fn evaluate_offline(&self, evaluation: &Evaluation, text: &str) -> Evaluated {
        match evaluation {
            Evaluation::ExactMatch {
                expected,
                case_sensitive,
            } => Evaluated::score(exact_match(text, expected, *case_sensitive)),
            Evaluation::Regex { pattern } => match Regex::new(pattern) {
                Ok(re) => Evaluated::score(if re.is_match(text.trim()) { 1.0 } else { 0.0 }),
                Err(e) => {
                    tracing::warn!("Invalid regex reference {:?}: {}", pattern, e);
                    Evaluated::fallback(INVALID_PATTERN)
                }
            },
            Evaluation::JsonSchema { schema } => match extract_json_span(text) {
                None => Evaluated::fallback(UNPARSEABLE_JSON),
                Some(instance) => match schema_score(&instance, schema, &self.schema_weights) {
                    Ok(result) if result.valid => Evaluated::score(1.0),
                    Ok(result) => Evaluated {
                        diagnostic: Some(format!(
                            "{}/{} top-level constraints satisfied",
                            result.satisfied, result.total
                        )),
                        ..Evaluated::score(result.score)
                    },
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Evaluated::fallback(INVALID_SCHEMA)
                    }
                },
            },
            Evaluation::Rubric { criteria } => {
                let result = evaluate_rubric(text, criteria);
                Evaluated {
                    diagnostic: Some(result.justification),
                    ..Evaluated::score(result.score)
                }
            }
            Evaluation::LlmJudge { .. } => Evaluated::unjudged(JUDGE_UNAVAILABLE),
        }
    }

    fn finish(&self, task: &Task, result: &RunResult, evaluated: Evaluated) -> ScoreRecord {
        let pricing = self
            .pricing
            .get(&result.model)
            .copied()
            .unwrap_or(Pricing::Unknown);
        let cost = compute_cost(result.token_usage.as_ref(), &pricing, self.cost_precision);

        tracing::debug!(
            task = %task.id,
            model = %result.model,
            status = result.status.as_str(),
            correctness = evaluated.correctness,
            "Scored"
        );

        ScoreRecord {
            task_id: task.id.clone(),
            model: result.model.clone(),
            provider: result.provider.clone(),
            category: task.category,
            method: task.method(),
            status: result.status,
            correctness: evaluated.correctness.clamp(0.0, 1.0),
            cost_usd: cost.cost_usd,
            cost_estimated: cost.estimated,
            latency_ms: result.latency_ms,
            attempt_count: result.attempt_count,
            input_tokens: result.token_usage.map(|u| u.input_tokens),
            output_tokens: result.token_usage.map(|u| u.output_tokens),
            judge_rationale: evaluated.judge_rationale,
            judge_calls: evaluated.judge_calls,
            judge_cost_usd: evaluated.judge_cost_usd,
            diagnostic: evaluated.diagnostic,
            error_message: result.error_message.clone(),
        }
    }
}

/// Trimmed equality, case-insensitive unless `case_sensitive`
pub fn exact_match(text: &str, expected: &str, case_sensitive: bool) -> f64 {
    let (a, b) = (text.trim(), expected.trim());
    let equal = if case_sensitive {
        a == b
    } else {
        a.to_lowercase() == b.to_lowercase()
    };
    if equal {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TokenUsage;
    use serde_json::json;

    fn model() -> ModelSpec {
        ModelSpec::new("m", "openai", "gpt-4o", Pricing::per_million(2.5, 10.0))
    }

    fn ok(task: &Task, text: &str) -> RunResult {
        RunResult::success(&task.id, &model(), text.to_string(), Some(TokenUsage::new(1000, 100)), 42, 1)
    }

    fn scorer() -> Scorer {
        Scorer::new(&[model()], 6)
    }

    #[test]
    fn test_exact_match_normalization() {
        assert_eq!(exact_match("  42\n", "42", false), 1.0);
        assert_eq!(exact_match("Paris", "paris", false), 1.0);
        assert_eq!(exact_match("Paris", "paris", true), 0.0);
        assert_eq!(exact_match("42.", "42", false), 0.0);
    }

    #[test]
    fn test_regex_searches_anywhere() {
        let task = Task::regex("r", Category::Coding, "p", r"def\s+add");
        let record = scorer().score_offline(&task, &ok(&task, "Here:\ndef add(a, b): return a + b"));
        assert_eq!(record.correctness, 1.0);

        let anchored = Task::regex("r2", Category::Reasoning, "p", r"^\d+$");
        assert_eq!(scorer().score_offline(&anchored, &ok(&anchored, "7\n")).correctness, 1.0);
        assert_eq!(scorer().score_offline(&anchored, &ok(&anchored, "seven")).correctness, 0.0);
    }

    #[test]
    fn test_invalid_regex_degrades() {
        let task = Task::regex("r", Category::Coding, "p", "(unclosed");
        let record = scorer().score_offline(&task, &ok(&task, "anything"));
        assert_eq!(record.correctness, 0.0);
        assert_eq!(record.diagnostic.as_deref(), Some(INVALID_PATTERN));
    }

    #[test]
    fn test_json_schema_partial_credit() {
        let schema = json!({"type": "object", "required": ["a", "b"], "properties": {"a": {"type": "string"}}});
        let task = Task::json_schema("j", Category::StructuredOutput, "p", schema);
        let record = scorer().score_offline(&task, &ok(&task, "Result: {\"a\": \"x\"}"));
        assert_eq!(record.correctness, 0.75);

        let record = scorer().score_offline(&task, &ok(&task, "no json at all"));
        assert_eq!(record.correctness, 0.0);
        assert_eq!(record.diagnostic.as_deref(), Some(UNPARSEABLE_JSON));
    }

    #[test]
    fn test_failure_scores_zero_without_comparison() {
        let task = Task::exact("e", Category::Reasoning, "p", "42");
        let failed = RunResult::failure("e", &model(), RunStatus::Timeout, "timed out", 1000, 3);
        let record = scorer().score_offline(&task, &failed);
        assert_eq!(record.correctness, 0.0);
        assert_eq!(record.cost_usd, 0.0);
        assert!(!record.cost_estimated);
        assert_eq!(record.status, RunStatus::Timeout);
        assert_eq!(record.attempt_count, 3);
    }

    #[test]
    fn test_cost_and_latency_copied() {
        let task = Task::exact("e", Category::Reasoning, "p", "42");
        let record = scorer().score_offline(&task, &ok(&task, "42"));
        // 1000 * 2.5 + 100 * 10 = 3500 per million
        assert!((record.cost_usd - 0.0035).abs() < 1e-12);
        assert!(record.cost_estimated);
        assert_eq!(record.latency_ms, 42);
        assert!(record.judge_rationale.is_empty());
    }

    #[test]
    fn test_unknown_model_pricing() {
        let task = Task::exact("e", Category::Reasoning, "p", "42");
        let other = ModelSpec::new("other", "openrouter", "x/y", Pricing::Unknown);
        let result = RunResult::success("e", &other, "42".into(), Some(TokenUsage::new(10, 10)), 1, 1);
        let record = scorer().score_offline(&task, &result);
        assert_eq!(record.cost_usd, 0.0);
        assert!(!record.cost_estimated);
    }

    #[tokio::test]
    async fn test_judge_without_channel_falls_back() {
        let task = Task::judged("j", Category::Summarization, "p", None);
        let record = scorer().score(&task, &ok(&task, "summary")).await;
        assert_eq!(record.correctness, 0.0);
        assert!(record.judge_rationale.starts_with(JUDGE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_scoring_is_idempotent() {
        let task = Task::json_schema(
            "j",
            Category::StructuredOutput,
            "p",
            json!({"type": "object", "required": ["a"]}),
        );
        let result = ok(&task, "{\"b\": 1}");
        let s = scorer();
        assert_eq!(s.score(&task, &result).await, s.score(&task, &result).await);
    }
}
