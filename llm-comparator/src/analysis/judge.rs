//! LLM-as-judge scoring
//!
//! The judge is a second model call made through a narrow
//! [`CompletionChannel`], so scoring never depends on the full dispatcher.
//! Verdicts are parsed tolerantly; when nothing usable comes back after one
//! retry the score falls back to 0.0 with a marker in the rationale.

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;

use super::schema::extract_json_span;
use crate::config::JudgeConfig;
use crate::models::ModelSpec;
use crate::providers::{CompletionRequest, Message};
use crate::tasks::{RunResult, Task, TokenUsage};

/// Rationale marker when no verdict could be parsed
pub const UNPARSEABLE_JUDGE_OUTPUT: &str = "unparseable-judge-output";
/// Rationale marker when the judge call itself kept failing
pub const JUDGE_UNAVAILABLE: &str = "judge-unavailable";

const JUDGE_SYSTEM_PROMPT: &str = "You are an objective evaluator. Respond only with valid JSON.";
const MIN_VERDICT: f64 = 1.0;
const MAX_VERDICT: f64 = 5.0;

/// Capability to issue one more request and await its terminal result
#[async_trait]
pub trait CompletionChannel: Send + Sync {
    async fn request(&self, task_id: &str, model: &ModelSpec, request: CompletionRequest) -> RunResult;
}

/// Judge model and generation settings
#[derive(Debug, Clone)]
pub struct JudgeSettings {
    pub model: ModelSpec,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl JudgeSettings {
    pub fn new(model: ModelSpec) -> Self {
        Self {
            model,
            temperature: 0.3,
            max_tokens: 1024,
        }
    }

    pub fn from_config(model: ModelSpec, config: &JudgeConfig) -> Self {
        Self {
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// A parsed judge verdict on the 1-5 scale
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub raw_score: f64,
    pub justification: String,
}

impl Verdict {
    /// Map 1-5 onto 0.0-1.0
    pub fn normalized(&self) -> f64 {
        ((self.raw_score - MIN_VERDICT) / (MAX_VERDICT - MIN_VERDICT)).clamp(0.0, 1.0)
    }
}

/// Result of judging one candidate response
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeOutcome {
    pub correctness: f64,
    pub rationale: String,
    /// Number of judge calls made (1 or 2)
    pub calls: u32,
    /// Tokens consumed by the judge, summed over calls
    pub usage: Option<TokenUsage>,
}

fn default_criteria() -> IndexMap<String, String> {
    IndexMap::from([
        ("correctness".to_string(), "Is the answer factually correct and complete?".to_string()),
        ("relevance".to_string(), "Does the answer directly address the question?".to_string()),
        ("clarity".to_string(), "Is the answer clear and well-structured?".to_string()),
        (
            "conciseness".to_string(),
            "Is the answer appropriately concise without unnecessary information?".to_string(),
        ),
    ])
}

/// Build the rubric prompt sent to the judge
pub fn build_judge_prompt(
    task_prompt: &str,
    candidate: &str,
    reference: Option<&str>,
    criteria: &IndexMap<String, String>,
) -> String {
    let defaults;
    let criteria = if criteria.is_empty() {
        defaults = default_criteria();
        &defaults
    } else {
        criteria
    };
    let criteria_text = criteria
        .iter()
        .map(|(name, question)| format!("- {}: {}", name, question))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = format!(
        "You are an expert evaluator. Evaluate the following model output based on these criteria:\n\n\
         {}\n\nOriginal Task Prompt:\n{}\n\nModel Output to Evaluate:\n{}\n",
        criteria_text, task_prompt, candidate
    );

    if let Some(reference) = reference.filter(|r| !r.trim().is_empty()) {
        prompt.push_str(&format!("\nReference Answer (for comparison):\n{}\n", reference));
    }

    prompt.push_str(
        "\nInstructions:\n\
         1. Analyze the output against each criterion\n\
         2. Provide a score from 1-5 for each criterion (1=poor, 5=excellent)\n\
         3. Calculate an overall score (average of criterion scores)\n\
         4. Provide brief justification\n\n\
         Respond in JSON format:\n\
         {\n  \"criterion_scores\": {\"correctness\": 4, \"relevance\": 5},\n  \
         \"overall_score\": 4.2,\n  \"justification\": \"Brief explanation...\"\n}\n",
    );
    prompt
}

fn score_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"(?i)"?overall[_ ]score"?\s*[:=]\s*"?(\d+(?:\.\d+)?)"#,
            r"(?i)\b(?:score|rating|verdict)\b\s*(?:of|is|:|=)?\s*(\d+(?:\.\d+)?)",
            r"(?i)(\d+(?:\.\d+)?)\s*(?:/|out\s+of)\s*5\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("judge score pattern compiles"))
        .collect()
    })
}

/// Any standalone number, with the scale it is given against when present
fn bare_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\b(?:\s*(?:/|out\s+of)\s*(\d+))?")
            .expect("bare number pattern compiles")
    })
}

/// First in-range number not stated against some other scale, e.g. `7/10`
fn first_bare_score(text: &str) -> Option<f64> {
    bare_number_pattern()
        .captures_iter(text)
        .filter(|c| c.get(2).map_or(true, |scale| scale.as_str() == "5"))
        .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
        .find_map(in_range)
}

fn in_range(score: f64) -> Option<f64> {
    (score.is_finite() && (MIN_VERDICT..=MAX_VERDICT).contains(&score)).then_some(score)
}

/// Parse a 1-5 verdict out of judge output, tolerating surrounding prose
pub fn parse_verdict(text: &str) -> Option<Verdict> {
    if let Some(serde_json::Value::Object(obj)) = extract_json_span(text) {
        let score = obj.get("overall_score").and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        if let Some(score) = score.and_then(in_range) {
            let justification = obj
                .get("justification")
                .and_then(|v| v.as_str())
                .unwrap_or("No justification provided")
                .to_string();
            return Some(Verdict {
                raw_score: score,
                justification,
            });
        }
    }

    let trimmed = text.trim();
    if let Some(score) = trimmed.parse::<f64>().ok().and_then(in_range) {
        return Some(Verdict {
            raw_score: score,
            justification: String::new(),
        });
    }

    for pattern in score_patterns() {
        let found = pattern
            .captures_iter(text)
            .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
            .find_map(in_range);
        if let Some(score) = found {
            return Some(Verdict {
                raw_score: score,
                justification: trimmed.chars().take(500).collect(),
            });
        }
    }

    first_bare_score(text).map(|score| Verdict {
        raw_score: score,
        justification: trimmed.chars().take(500).collect(),
    })
}

fn add_usage(total: Option<TokenUsage>, more: Option<TokenUsage>) -> Option<TokenUsage> {
    match (total, more) {
        (Some(a), Some(b)) => Some(TokenUsage::new(
            a.input_tokens.saturating_add(b.input_tokens),
            a.output_tokens.saturating_add(b.output_tokens),
        )),
        (a, b) => a.or(b),
    }
}

/// Ask the judge for a verdict, retrying once when no verdict is usable
pub async fn judge_response(
    channel: &dyn CompletionChannel,
    settings: &JudgeSettings,
    task: &Task,
    candidate: &str,
    reference: Option<&str>,
    criteria: &IndexMap<String, String>,
) -> JudgeOutcome {
    let prompt = build_judge_prompt(&task.prompt, candidate, reference, criteria);
    let request = CompletionRequest::new(
        &settings.model.resolved_model_id,
        vec![Message::user(prompt)],
        settings.max_tokens,
    )
    .with_system(JUDGE_SYSTEM_PROMPT)
    .with_temperature(settings.temperature);

    let judge_task_id = format!("{}::judge", task.id);
    let mut usage = None;
    let mut last_failure: Option<String> = None;

    for call in 1..=2u32 {
        let result = channel
            .request(&judge_task_id, &settings.model, request.clone())
            .await;
        usage = add_usage(usage, result.token_usage);

        match result.raw_text.as_deref().filter(|_| result.is_success()) {
            Some(text) => match parse_verdict(text) {
                Some(verdict) => {
                    return JudgeOutcome {
                        correctness: verdict.normalized(),
                        rationale: verdict.justification,
                        calls: call,
                        usage,
                    };
                }
                None => {
                    tracing::warn!(task = %task.id, call, "Judge output had no parseable verdict");
                    last_failure = None;
                }
            },
            None => {
                let error = result
                    .error_message
                    .unwrap_or_else(|| result.status.as_str().to_string());
                tracing::warn!(task = %task.id, call, "Judge call failed: {}", error);
                last_failure = Some(error);
            }
        }
    }

    let rationale = match last_failure {
        Some(error) => format!("{}: {}", JUDGE_UNAVAILABLE, error),
        None => UNPARSEABLE_JUDGE_OUTPUT.to_string(),
    };
    JudgeOutcome {
        correctness: 0.0,
        rationale,
        calls: 2,
        usage,
    }
}
