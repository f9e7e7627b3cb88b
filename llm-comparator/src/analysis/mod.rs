//! Response scoring, cost accounting and aggregation

pub mod comparator;
pub mod cost;
pub mod judge;
pub mod metrics;
pub mod rubric;
pub mod schema;
pub mod scoring;

pub use comparator::{compare, CategoryLeader, ComparisonReport, TaskComparison};
pub use cost::{compute_cost, CostEstimate};
pub use judge::{
    parse_verdict, CompletionChannel, JudgeOutcome, JudgeSettings, Verdict, JUDGE_UNAVAILABLE,
    UNPARSEABLE_JUDGE_OUTPUT,
};
pub use metrics::{aggregate, GroupBy, Summary};
pub use rubric::{evaluate_rubric, RubricCriterion, RubricRule, RuleCondition, Structure};
pub use schema::{extract_json_span, schema_score, SchemaScore, SchemaWeights};
pub use scoring::{ScoreRecord, Scorer, INVALID_PATTERN, INVALID_SCHEMA, UNPARSEABLE_JSON};
