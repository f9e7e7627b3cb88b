//! Aggregation of score records into per-model summaries

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::scoring::ScoreRecord;
use crate::tasks::Category;

/// Grouping key for [`aggregate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    ModelOnly,
    ModelAndCategory,
}

/// Summary statistics for one model, optionally within one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    pub runs: usize,
    pub successes: usize,
    /// Mean correctness, zero-scored failures included
    pub avg_score: f64,
    pub median_score: f64,
    pub score_std_dev: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
    pub total_cost_usd: f64,
    /// Judge spend on this group's records, not included in `total_cost_usd`
    #[serde(default)]
    pub total_judge_cost_usd: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Fraction of runs whose status was Success
    pub success_rate: f64,
    /// False if any record's cost could not be computed
    pub cost_complete: bool,
}

/// Fold score records into summaries, ordered by descending `avg_score`.
///
/// Groups with no records are simply absent.
pub fn aggregate(records: &[ScoreRecord], group_by: GroupBy) -> Vec<Summary> {
    let mut groups: IndexMap<(String, Option<Category>), Vec<&ScoreRecord>> = IndexMap::new();
    for record in records {
        let category = match group_by {
            GroupBy::ModelOnly => None,
            GroupBy::ModelAndCategory => Some(record.category),
        };
        groups
            .entry((record.model.clone(), category))
            .or_default()
            .push(record);
    }

    let mut summaries: Vec<Summary> = groups
        .into_iter()
        .filter_map(|((model, category), group)| summarize(model, category, &group))
        .collect();

    summaries.sort_by(|a, b| {
        b.avg_score
            .partial_cmp(&a.avg_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.model.cmp(&b.model))
            .then_with(|| a.category.cmp(&b.category))
    });
    summaries
}

fn summarize(model: String, category: Option<Category>, group: &[&ScoreRecord]) -> Option<Summary> {
    if group.is_empty() {
        return None;
    }
    let n = group.len() as f64;

    let scores: Vec<f64> = group.iter().map(|r| r.correctness).collect();
    let avg_score = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - avg_score).powi(2)).sum::<f64>() / n;

    let mut latencies: Vec<u64> = group.iter().map(|r| r.latency_ms).collect();
    latencies.sort_unstable();
    let avg_latency_ms = latencies.iter().map(|&l| l as f64).sum::<f64>() / n;

    let successes = group.iter().filter(|r| r.is_success()).count();

    Some(Summary {
        model,
        category,
        runs: group.len(),
        successes,
        avg_score,
        median_score: median(&scores),
        score_std_dev: variance.sqrt(),
        avg_latency_ms,
        p50_latency_ms: percentile(&latencies, 50.0),
        p95_latency_ms: percentile(&latencies, 95.0),
        p99_latency_ms: percentile(&latencies, 99.0),
        total_cost_usd: group.iter().map(|r| r.cost_usd.max(0.0)).sum(),
        total_judge_cost_usd: group.iter().map(|r| r.judge_cost_usd.max(0.0)).sum(),
        total_input_tokens: group.iter().filter_map(|r| r.input_tokens).map(u64::from).sum(),
        total_output_tokens: group.iter().filter_map(|r| r.output_tokens).map(u64::from).sum(),
        success_rate: successes as f64 / n,
        cost_complete: group.iter().all(|r| r.cost_estimated),
    })
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.is_empty() {
        0.0
    } else if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Nearest-rank percentile over sorted values
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p * sorted.len() as f64 / 100.0).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{EvaluationMethod, RunStatus};

    fn record(model: &str, category: Category, correctness: f64, status: RunStatus, latency_ms: u64, cost: Option<f64>) -> ScoreRecord {
        ScoreRecord {
            task_id: format!("{}-{}-{}", model, category, latency_ms),
            model: model.to_string(),
            provider: "openai".to_string(),
            category,
            method: EvaluationMethod::ExactMatch,
            status,
            correctness,
            cost_usd: cost.unwrap_or(0.0),
            cost_estimated: cost.is_some(),
            latency_ms,
            attempt_count: 1,
            input_tokens: cost.map(|_| 100),
            output_tokens: cost.map(|_| 10),
            judge_rationale: String::new(),
            judge_calls: 0,
            judge_cost_usd: 0.0,
            diagnostic: None,
            error_message: None,
        }
    }

    #[test]
    fn test_model_only_summary() {
        let records = vec![
            record("x", Category::Reasoning, 1.0, RunStatus::Success, 100, Some(0.01)),
            record("x", Category::Coding, 0.5, RunStatus::Success, 300, Some(0.02)),
            record("y", Category::Reasoning, 0.0, RunStatus::Timeout, 1000, None),
        ];
        let summaries = aggregate(&records, GroupBy::ModelOnly);
        assert_eq!(summaries.len(), 2);

        let x = &summaries[0];
        assert_eq!(x.model, "x");
        assert_eq!(x.avg_score, 0.75);
        assert_eq!(x.avg_latency_ms, 200.0);
        assert!((x.total_cost_usd - 0.03).abs() < 1e-12);
        assert_eq!(x.success_rate, 1.0);
        assert!(x.cost_complete);
        assert_eq!(x.total_input_tokens, 200);

        let y = &summaries[1];
        assert_eq!(y.avg_score, 0.0);
        assert_eq!(y.success_rate, 0.0);
        assert!(!y.cost_complete);
        assert_eq!(y.total_cost_usd, 0.0);
    }

    #[test]
    fn test_model_and_category_grouping() {
        let records = vec![
            record("x", Category::Reasoning, 1.0, RunStatus::Success, 100, None),
            record("x", Category::Coding, 0.2, RunStatus::Success, 100, None),
            record("x", Category::Reasoning, 0.0, RunStatus::ProviderError, 100, None),
        ];
        let summaries = aggregate(&records, GroupBy::ModelAndCategory);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].category, Some(Category::Reasoning));
        assert_eq!(summaries[0].avg_score, 0.5);
        assert_eq!(summaries[0].success_rate, 0.5);
        assert_eq!(summaries[1].category, Some(Category::Coding));
    }

    #[test]
    fn test_judge_cost_totalled_separately() {
        let mut judged = record("x", Category::Summarization, 0.75, RunStatus::Success, 100, Some(0.01));
        judged.judge_calls = 1;
        judged.judge_cost_usd = 0.002;
        let records = vec![judged, record("x", Category::Coding, 1.0, RunStatus::Success, 100, Some(0.01))];

        let summary = &aggregate(&records, GroupBy::ModelOnly)[0];
        assert!((summary.total_cost_usd - 0.02).abs() < 1e-12);
        assert!((summary.total_judge_cost_usd - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input_has_no_groups() {
        assert!(aggregate(&[], GroupBy::ModelOnly).is_empty());
    }

    #[test]
    fn test_percentiles_and_spread() {
        let records: Vec<_> = (1..=100)
            .map(|i| record("x", Category::Coding, if i % 2 == 0 { 1.0 } else { 0.0 }, RunStatus::Success, i * 10, None))
            .collect();
        let s = &aggregate(&records, GroupBy::ModelOnly)[0];
        assert_eq!(s.p50_latency_ms, 500);
        assert_eq!(s.p95_latency_ms, 950);
        assert_eq!(s.p99_latency_ms, 990);
        assert_eq!(s.median_score, 0.5);
        assert!((s.score_std_dev - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let records = vec![
            record("b", Category::Coding, 0.5, RunStatus::Success, 1, None),
            record("a", Category::Coding, 0.5, RunStatus::Success, 1, None),
        ];
        let first = aggregate(&records, GroupBy::ModelOnly);
        let reversed: Vec<_> = records.iter().rev().cloned().collect();
        assert_eq!(first, aggregate(&reversed, GroupBy::ModelOnly));
        assert_eq!(first[0].model, "a");
    }
}
