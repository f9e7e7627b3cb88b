//! Cross-model comparison: per-task winners and category leaders

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::metrics::{aggregate, GroupBy};
use super::scoring::ScoreRecord;
use crate::tasks::Category;

/// Models ranked on a single task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskComparison {
    pub task_id: String,
    pub models_ranked: Vec<String>,
    /// None when the top score is shared
    pub winner: Option<String>,
    pub margin: Option<f64>,
}

/// Best model within a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLeader {
    pub category: Category,
    pub model: String,
    pub avg_score: f64,
    pub runner_up: Option<String>,
    /// Lead over the runner-up in average score
    pub margin: Option<f64>,
}

/// Comparison results across all tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub task_comparisons: Vec<TaskComparison>,
    pub wins_by_model: IndexMap<String, u32>,
    pub category_leaders: Vec<CategoryLeader>,
}

/// Rank each task's records by correctness
pub fn compare_tasks(records: &[ScoreRecord]) -> Vec<TaskComparison> {
    let mut by_task: IndexMap<&str, Vec<&ScoreRecord>> = IndexMap::new();
    for record in records {
        by_task.entry(record.task_id.as_str()).or_default().push(record);
    }

    by_task
        .into_iter()
        .map(|(task_id, mut group)| {
            group.sort_by(|a, b| {
                b.correctness
                    .partial_cmp(&a.correctness)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.model.cmp(&b.model))
            });

            let margin = match group.as_slice() {
                [first, second, ..] => Some(first.correctness - second.correctness),
                _ => None,
            };
            let winner = match margin {
                Some(m) if m <= 0.0 => None,
                _ => group.first().map(|r| r.model.clone()),
            };

            TaskComparison {
                task_id: task_id.to_string(),
                models_ranked: group.iter().map(|r| r.model.clone()).collect(),
                winner,
                margin,
            }
        })
        .collect()
}

/// Best model per category by average score, in category order
pub fn category_leaders(records: &[ScoreRecord]) -> Vec<CategoryLeader> {
    let mut by_category: IndexMap<Category, Vec<(String, f64)>> = IndexMap::new();
    for summary in aggregate(records, GroupBy::ModelAndCategory) {
        if let Some(category) = summary.category {
            by_category
                .entry(category)
                .or_default()
                .push((summary.model, summary.avg_score));
        }
    }
    by_category.sort_keys();

    by_category
        .into_iter()
        .filter_map(|(category, ranked)| {
            // `aggregate` already orders by descending score
            let (model, avg_score) = ranked.first().cloned()?;
            let runner_up = ranked.get(1);
            Some(CategoryLeader {
                category,
                model,
                avg_score,
                runner_up: runner_up.map(|(m, _)| m.clone()),
                margin: runner_up.map(|(_, s)| avg_score - s),
            })
        })
        .collect()
}

/// Full comparison: per-task rankings, win counts and category leaders
pub fn compare(records: &[ScoreRecord]) -> ComparisonReport {
    let task_comparisons = compare_tasks(records);

    let mut wins_by_model: IndexMap<String, u32> = IndexMap::new();
    for comparison in &task_comparisons {
        if let Some(winner) = &comparison.winner {
            *wins_by_model.entry(winner.clone()).or_insert(0) += 1;
        }
    }
    wins_by_model.sort_by(|ka, a, kb, b| b.cmp(a).then_with(|| ka.cmp(kb)));

    ComparisonReport {
        task_comparisons,
        wins_by_model,
        category_leaders: category_leaders(records),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{EvaluationMethod, RunStatus};

    fn record(task: &str, model: &str, category: Category, correctness: f64) -> ScoreRecord {
        ScoreRecord {
            task_id: task.to_string(),
            model: model.to_string(),
            provider: "openrouter".to_string(),
            category,
            method: EvaluationMethod::Regex,
            status: RunStatus::Success,
            correctness,
            cost_usd: 0.0,
            cost_estimated: false,
            latency_ms: 10,
            attempt_count: 1,
            input_tokens: None,
            output_tokens: None,
            judge_rationale: String::new(),
            judge_calls: 0,
            judge_cost_usd: 0.0,
            diagnostic: None,
            error_message: None,
        }
    }

    fn records() -> Vec<ScoreRecord> {
        vec![
            record("t1", "a", Category::Coding, 0.9),
            record("t1", "b", Category::Coding, 0.8),
            record("t2", "a", Category::Reasoning, 0.5),
            record("t2", "b", Category::Reasoning, 1.0),
            record("t3", "a", Category::Reasoning, 1.0),
            record("t3", "b", Category::Reasoning, 1.0),
        ]
    }

    #[test]
    fn test_task_winners() {
        let comparisons = compare_tasks(&records());
        assert_eq!(comparisons[0].winner.as_deref(), Some("a"));
        assert!((comparisons[0].margin.unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(comparisons[1].winner.as_deref(), Some("b"));
        assert_eq!(comparisons[2].winner, None);
    }

    #[test]
    fn test_wins_and_leaders() {
        let report = compare(&records());
        assert_eq!(report.wins_by_model.get("a"), Some(&1));
        assert_eq!(report.wins_by_model.get("b"), Some(&1));

        let leaders = &report.category_leaders;
        assert_eq!(leaders.len(), 2);
        assert_eq!(leaders[0].category, Category::Coding);
        assert_eq!(leaders[0].model, "a");
        assert_eq!(leaders[1].category, Category::Reasoning);
        assert_eq!(leaders[1].model, "b");
        assert_eq!(leaders[1].margin, Some(0.25));
    }
}
