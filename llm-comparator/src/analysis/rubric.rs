//! Rule-based rubric scoring

use serde::{Deserialize, Serialize};

/// A scored criterion: rules award points, capped at `max_points`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricCriterion {
    pub name: String,
    #[serde(default = "default_max_points")]
    pub max_points: f64,
    pub rules: Vec<RubricRule>,
}

fn default_max_points() -> f64 { 1.0 }

/// A single rule within a criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricRule {
    #[serde(flatten)]
    pub condition: RuleCondition,
    pub points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Condition a response must meet for a rule to award its points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", content = "value", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Substring present (case-sensitive)
    Contains(String),
    /// At least this many characters
    MinLength(usize),
    /// At most this many characters
    MaxLength(usize),
    HasStructure(Structure),
}

/// Layout markers checked by `has_structure`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Structure {
    Paragraphs,
    BulletPoints,
}

impl RubricCriterion {
    pub fn new(name: impl Into<String>, max_points: f64) -> Self {
        Self {
            name: name.into(),
            max_points,
            rules: Vec::new(),
        }
    }

    /// Add a rule
    pub fn rule(mut self, condition: RuleCondition, points: f64) -> Self {
        self.rules.push(RubricRule {
            condition,
            points,
            description: None,
        });
        self
    }
}

/// Score from a rubric evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricScore {
    /// Normalized to 0.0 - 1.0
    pub score: f64,
    pub justification: String,
}

/// Evaluate a response against a list of criteria
pub fn evaluate_rubric(response: &str, criteria: &[RubricCriterion]) -> RubricScore {
    let mut total = 0.0;
    let mut max_total = 0.0;
    let mut notes = Vec::new();

    for criterion in criteria {
        let max_points = criterion.max_points.max(0.0);
        max_total += max_points;

        let mut earned = 0.0;
        for rule in &criterion.rules {
            if rule_matches(response, &rule.condition) {
                earned += rule.points.max(0.0);
                notes.push(format!(
                    "{}: +{} ({})",
                    criterion.name,
                    rule.points,
                    rule.description.as_deref().unwrap_or_else(|| describe(&rule.condition))
                ));
            }
        }
        total += f64::min(earned, max_points);
    }

    let score = if max_total > 0.0 { total / max_total } else { 0.0 };
    let justification = if notes.is_empty() {
        "No criteria met".to_string()
    } else {
        notes.join("; ")
    };

    RubricScore { score, justification }
}

fn rule_matches(response: &str, condition: &RuleCondition) -> bool {
    match condition {
        RuleCondition::Contains(value) => response.contains(value.as_str()),
        RuleCondition::MinLength(min) => response.chars().count() >= *min,
        RuleCondition::MaxLength(max) => response.chars().count() <= *max,
        RuleCondition::HasStructure(Structure::Paragraphs) => response.contains("\n\n"),
        RuleCondition::HasStructure(Structure::BulletPoints) => has_bullets(response),
    }
}

fn has_bullets(response: &str) -> bool {
    response.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("- ") || line.starts_with("* ") || line.starts_with('•')
    })
}

fn describe(condition: &RuleCondition) -> &'static str {
    match condition {
        RuleCondition::Contains(_) => "matched",
        RuleCondition::MinLength(_) => "length requirement met",
        RuleCondition::MaxLength(_) => "within length limit",
        RuleCondition::HasStructure(Structure::Paragraphs) => "has paragraphs",
        RuleCondition::HasStructure(Structure::BulletPoints) => "has bullet points",
    }
}
