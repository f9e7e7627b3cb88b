//! Results reporting

pub mod csv;
pub mod markdown;
pub mod store;

pub use csv::records_to_csv;
pub use markdown::render_markdown;
pub use store::{ResultStore, StoreError};

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::OutputConfig;
use crate::engine::BenchmarkOutcome;
use crate::tasks::RunResult;

/// JSON summary export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSummary {
    pub run_id: String,
    pub timestamp: String,
    pub total_tasks: usize,
    pub total_pairs: usize,
    pub judge_model: Option<String>,
    pub model_rankings: Vec<ModelRanking>,
    pub category_leaders: Vec<CategoryLeaderEntry>,
    pub detailed_results_file: String,
}

/// Model ranking in summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRanking {
    pub model: String,
    pub provider: String,
    pub wins: u32,
    pub avg_score: f64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub total_cost_usd: f64,
    pub total_judge_cost_usd: f64,
    pub cost_complete: bool,
}

/// Category leader info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryLeaderEntry {
    pub category: String,
    pub leader: String,
    pub margin: f64,
}

impl JsonSummary {
    /// Create from a finished run
    pub fn from_outcome(outcome: &BenchmarkOutcome, detailed_file: impl Into<String>) -> Self {
        let model_rankings = outcome
            .summaries
            .iter()
            .map(|s| ModelRanking {
                model: s.model.clone(),
                provider: outcome
                    .models
                    .iter()
                    .find(|m| m.alias == s.model)
                    .map(|m| m.resolved_provider.clone())
                    .unwrap_or_default(),
                wins: outcome.comparison.wins_by_model.get(&s.model).copied().unwrap_or(0),
                avg_score: s.avg_score,
                success_rate: s.success_rate,
                avg_latency_ms: s.avg_latency_ms,
                total_cost_usd: s.total_cost_usd,
                total_judge_cost_usd: s.total_judge_cost_usd,
                cost_complete: s.cost_complete,
            })
            .collect();

        let category_leaders = outcome
            .comparison
            .category_leaders
            .iter()
            .map(|l| CategoryLeaderEntry {
                category: l.category.as_str().to_string(),
                leader: l.model.clone(),
                margin: l.margin.unwrap_or(0.0),
            })
            .collect();

        Self {
            run_id: outcome.run_id.clone(),
            timestamp: outcome.completed_at.to_rfc3339(),
            total_tasks: outcome.task_count,
            total_pairs: outcome.records.len(),
            judge_model: outcome.judge_model.clone(),
            model_rankings,
            category_leaders,
            detailed_results_file: detailed_file.into(),
        }
    }

    /// Write to JSON file
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

/// Append run results to a JSONL log, one object per line
pub fn write_jsonl(path: impl AsRef<Path>, results: &[RunResult]) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let mut writer = std::io::BufWriter::new(file);
    for result in results {
        let line = serde_json::to_string(result)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{}", line)?;
    }
    writer.flush()
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

/// Save each successful response as `responses/<model>/<task>.txt`
pub fn write_responses(dir: impl AsRef<Path>, results: &[RunResult]) -> std::io::Result<usize> {
    let root = dir.as_ref().join("responses");
    let mut written = 0;
    for result in results {
        let Some(text) = &result.raw_text else { continue };
        let model_dir = root.join(sanitize(&result.model));
        std::fs::create_dir_all(&model_dir)?;
        std::fs::write(model_dir.join(format!("{}.txt", sanitize(&result.task_id))), text)?;
        written += 1;
    }
    Ok(written)
}

/// Write every enabled report format into `dir`, returning the files created
pub fn write_reports(
    outcome: &BenchmarkOutcome,
    output: &OutputConfig,
    dir: impl AsRef<Path>,
) -> std::io::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let stem = format!("results_{}", outcome.run_id);
    let mut written = Vec::new();

    if output.csv {
        let path = dir.join(format!("{}.csv", stem));
        std::fs::write(&path, records_to_csv(&outcome.records))?;
        written.push(path);
    }

    let detailed = dir.join(format!("{}.json", stem));
    if output.json {
        let json = serde_json::to_string_pretty(&outcome.records)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&detailed, json)?;
        written.push(detailed.clone());

        let summary_path = dir.join(format!("summary_{}.json", outcome.run_id));
        JsonSummary::from_outcome(outcome, detailed.display().to_string()).write_to_file(&summary_path)?;
        written.push(summary_path);
    }

    if output.jsonl {
        let path = dir.join(format!("{}.jsonl", stem));
        write_jsonl(&path, &outcome.run_results)?;
        written.push(path);
    }

    if output.markdown {
        let path = dir.join(format!("comparison_report_{}.md", outcome.run_id));
        let report = render_markdown(outcome)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&path, report)?;
        written.push(path);
    }

    if output.sqlite {
        let path = dir.join(store::DATABASE_FILE);
        ResultStore::open(&path)
            .and_then(|mut db| db.record_outcome(outcome))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        written.push(path);
    }

    if output.save_responses {
        let count = write_responses(dir, &outcome.run_results)?;
        tracing::debug!("Saved {} responses", count);
    }

    tracing::info!("Reports written to {}", dir.display());
    Ok(written)
}

/// Generate a console report
pub fn print_console_report(outcome: &BenchmarkOutcome) {
    println!("\n=== LLM Comparison Results ===\n");
    println!(
        "Run {}: {} tasks x {} models\n",
        outcome.run_id,
        outcome.task_count,
        outcome.models.len()
    );

    println!("Model Rankings:");
    println!("{:-<50}", "");
    for (i, s) in outcome.summaries.iter().enumerate() {
        let wins = outcome.comparison.wins_by_model.get(&s.model).copied().unwrap_or(0);
        println!(
            "  {}. {} - Avg Score: {:.3}, Success: {:.0}%, Avg Latency: {:.0}ms, Cost: ${:.4}{}, Wins: {}",
            i + 1,
            s.model,
            s.avg_score,
            s.success_rate * 100.0,
            s.avg_latency_ms,
            s.total_cost_usd,
            if s.cost_complete { "" } else { "*" },
            wins
        );
    }

    if !outcome.comparison.category_leaders.is_empty() {
        println!("\nCategory Leaders:");
        println!("{:-<50}", "");
        for leader in &outcome.comparison.category_leaders {
            println!(
                "  {}: {} ({:.3})",
                leader.category.label(),
                leader.model,
                leader.avg_score
            );
        }
    }

    if let Some(judge) = &outcome.judge_model {
        let judge_cost: f64 = outcome.summaries.iter().map(|s| s.total_judge_cost_usd).sum();
        println!("\nJudge {} cost ${:.4} on top of the model costs above", judge, judge_cost);
    }

    let failed = outcome.failed_pairs();
    if failed > 0 {
        println!("\n{} of {} pairs failed (see error_message in the detailed results)", failed, outcome.records.len());
    }

    println!("\n{:=<50}", "");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{aggregate, compare, GroupBy, Scorer};
    use crate::models::{ModelSpec, Pricing};
    use crate::tasks::{Category, RunStatus, Task, TokenUsage};
    use chrono::Utc;

    fn outcome() -> BenchmarkOutcome {
        let x = ModelSpec::new("x", "openai", "gpt-4o", Pricing::per_million(2.5, 10.0));
        let y = ModelSpec::new("y", "openrouter", "meta/llama", Pricing::Unknown);
        let tasks = vec![
            Task::exact("math_01", Category::Reasoning, "6*7?", "42"),
            Task::regex("digits_01", Category::Coding, "Digits only", r"^\d+$"),
        ];
        let run_results = vec![
            RunResult::success("math_01", &x, "42".into(), Some(TokenUsage::new(1000, 100)), 120, 1),
            RunResult::failure("math_01", &y, RunStatus::Timeout, "timed out", 5000, 3),
            RunResult::success("digits_01", &x, "7".into(), Some(TokenUsage::new(800, 10)), 90, 1),
            RunResult::failure("digits_01", &y, RunStatus::Timeout, "timed out", 5000, 3),
        ];
        let scorer = Scorer::new(&[x.clone(), y.clone()], 6);
        let records: Vec<_> = run_results
            .iter()
            .map(|r| {
                let task = tasks.iter().find(|t| t.id == r.task_id).unwrap();
                scorer.score_offline(task, r)
            })
            .collect();

        BenchmarkOutcome {
            run_id: "20260101-000000".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            models: vec![x, y],
            judge_model: None,
            task_count: tasks.len(),
            summaries: aggregate(&records, GroupBy::ModelOnly),
            category_summaries: aggregate(&records, GroupBy::ModelAndCategory),
            comparison: compare(&records),
            run_results,
            records,
        }
    }

    #[test]
    fn test_json_summary_rankings() {
        let summary = JsonSummary::from_outcome(&outcome(), "results.json");
        assert_eq!(summary.total_pairs, 4);
        assert_eq!(summary.model_rankings[0].model, "x");
        assert_eq!(summary.model_rankings[0].provider, "openai");
        assert_eq!(summary.model_rankings[0].wins, 2);
        assert_eq!(summary.model_rankings[1].success_rate, 0.0);
        assert!(!summary.model_rankings[1].cost_complete);
    }

    #[test]
    fn test_markdown_sections() {
        let report = render_markdown(&outcome()).unwrap();
        assert!(report.starts_with("# LLM Comparison Report"));
        assert!(report.contains("## Executive Summary"));
        assert!(report.contains("| x | 1.0000 | 100.0 |"));
        assert!(report.contains("| y | 0.0000 | 0.0 |"));
        assert!(report.contains("## Performance by Category"));
        assert!(report.contains("## Detailed Results"));
        assert!(report.contains("cost incomplete"));
    }

    /// Accepts a fixed number of bytes, then fails
    struct FullBuffer(usize);

    impl std::fmt::Write for FullBuffer {
        fn write_str(&mut self, s: &str) -> std::fmt::Result {
            self.0 = self.0.checked_sub(s.len()).ok_or(std::fmt::Error)?;
            Ok(())
        }
    }

    #[test]
    fn test_markdown_write_errors_propagate() {
        assert!(markdown::write_markdown(&mut FullBuffer(64), &outcome()).is_err());
        assert!(markdown::write_markdown(&mut FullBuffer(usize::MAX), &outcome()).is_ok());
    }

    #[test]
    fn test_write_reports_creates_all_formats() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputConfig {
            save_responses: true,
            ..OutputConfig::default()
        };
        let files = write_reports(&outcome(), &output, dir.path()).unwrap();
        assert_eq!(files.len(), 6);
        for file in &files {
            assert!(file.exists(), "{} missing", file.display());
        }

        let jsonl = files.iter().find(|p| p.extension().is_some_and(|e| e == "jsonl")).unwrap();
        let content = std::fs::read_to_string(jsonl).unwrap();
        assert_eq!(content.lines().count(), 4);
        let first: RunResult = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(first.task_id, "math_01");

        let response = dir.path().join("responses").join("x").join("math_01.txt");
        assert_eq!(std::fs::read_to_string(response).unwrap(), "42");

        let db = ResultStore::open(dir.path().join(store::DATABASE_FILE)).unwrap();
        assert_eq!(db.results_for_run("20260101-000000").unwrap().len(), 4);
    }

    #[test]
    fn test_history_queryable_by_run() {
        let mut db = ResultStore::open_in_memory().unwrap();
        let first = outcome();
        let mut second = outcome();
        second.run_id = "20260102-000000".to_string();
        second.records.truncate(2);
        db.record_outcome(&first).unwrap();
        db.record_outcome(&second).unwrap();

        assert_eq!(db.runs().unwrap().len(), 2);
        let run = db.run("20260101-000000").unwrap().unwrap();
        assert_eq!(run.models, "x,y");
        assert_eq!(run.total_pairs, 4);
        assert_eq!(run.failed_pairs, 2);
        assert!(db.run("missing").unwrap().is_none());

        let results = db.results_for_run("20260101-000000").unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].task_id, "math_01");
        assert_eq!(results[0].raw_output.as_deref(), Some("42"));
        assert_eq!(results[0].input_tokens, Some(1000));
        assert!(results[0].cost_estimated);
        assert_eq!(results[1].status, "timeout");
        assert_eq!(results[1].raw_output, None);
        assert_eq!(results[1].attempt_count, 3);
        assert_eq!(db.results_for_run("20260102-000000").unwrap().len(), 2);
        assert_eq!(db.task_count("20260101-000000").unwrap(), 2);

        let metrics = db.metrics_for_run("20260101-000000").unwrap();
        assert_eq!(metrics[0].model, "x");
        assert_eq!(metrics[0].category, None);
        assert_eq!(metrics[0].mean_score, 1.0);
        assert_eq!(metrics[1].failure_rate, 1.0);
        assert!(metrics.iter().any(|m| m.category.as_deref() == Some("coding")));
    }

    #[test]
    fn test_rerecording_a_run_replaces_it() {
        let mut db = ResultStore::open_in_memory().unwrap();
        db.record_outcome(&outcome()).unwrap();
        db.record_outcome(&outcome()).unwrap();
        assert_eq!(db.runs().unwrap().len(), 1);
        assert_eq!(db.results_for_run("20260101-000000").unwrap().len(), 4);
        assert_eq!(db.metrics_for_run("20260101-000000").unwrap().len(), 2 + 4);
    }
}
