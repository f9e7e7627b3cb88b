//! Markdown comparison report

use std::fmt::{self, Write};

use crate::engine::BenchmarkOutcome;
use crate::tasks::Category;

/// Rows shown in the detailed results section
pub const DETAIL_ROWS: usize = 20;

fn table_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

fn separator(columns: usize) -> String {
    format!("|{}", "---|".repeat(columns))
}

/// Render the full Markdown report for a run
pub fn render_markdown(outcome: &BenchmarkOutcome) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_markdown(&mut out, outcome)?;
    Ok(out)
}

/// Write the full Markdown report for a run into `out`
pub fn write_markdown(out: &mut impl Write, outcome: &BenchmarkOutcome) -> fmt::Result {
    writeln!(out, "# LLM Comparison Report")?;
    writeln!(out, "Generated on: {}", outcome.completed_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(out)?;
    writeln!(
        out,
        "Run `{}`: {} tasks x {} models",
        outcome.run_id,
        outcome.task_count,
        outcome.models.len()
    )?;
    if let Some(judge) = &outcome.judge_model {
        let judge_cost: f64 = outcome.summaries.iter().map(|s| s.total_judge_cost_usd).sum();
        writeln!(out, "Judge model: `{}` (judge cost: ${:.6})", judge, judge_cost)?;
    }
    writeln!(out)?;

    write_executive_summary(out, outcome)?;
    write_category_table(out, outcome)?;
    write_leaders(out, outcome)?;
    write_details(out, outcome)
}

fn write_executive_summary(out: &mut impl Write, outcome: &BenchmarkOutcome) -> fmt::Result {
    writeln!(out, "## Executive Summary")?;
    writeln!(
        out,
        "{}",
        table_row(&[
            "Model".into(),
            "Avg Score".into(),
            "Success Rate (%)".into(),
            "Avg Latency (ms)".into(),
            "p95 Latency (ms)".into(),
            "Total Cost (USD)".into(),
            "Wins".into(),
        ])
    )?;
    writeln!(out, "{}", separator(7))?;
    for s in &outcome.summaries {
        let cost = if s.cost_complete {
            format!("{:.6}", s.total_cost_usd)
        } else {
            format!("{:.6}*", s.total_cost_usd)
        };
        let wins = outcome.comparison.wins_by_model.get(&s.model).copied().unwrap_or(0);
        writeln!(
            out,
            "{}",
            table_row(&[
                s.model.clone(),
                format!("{:.4}", s.avg_score),
                format!("{:.1}", s.success_rate * 100.0),
                format!("{:.0}", s.avg_latency_ms),
                s.p95_latency_ms.to_string(),
                cost,
                wins.to_string(),
            ])
        )?;
    }
    if outcome.summaries.iter().any(|s| !s.cost_complete) {
        writeln!(out)?;
        writeln!(out, "*\\* cost incomplete: some responses lacked token usage or pricing*")?;
    }
    writeln!(out)
}

fn write_category_table(out: &mut impl Write, outcome: &BenchmarkOutcome) -> fmt::Result {
    let mut categories: Vec<Category> = outcome
        .category_summaries
        .iter()
        .filter_map(|s| s.category)
        .collect();
    categories.sort();
    categories.dedup();
    if categories.is_empty() {
        return Ok(());
    }

    writeln!(out, "## Performance by Category")?;
    let mut header = vec!["Model".to_string()];
    header.extend(categories.iter().map(|c| c.label().to_string()));
    writeln!(out, "{}", table_row(&header))?;
    writeln!(out, "{}", separator(header.len()))?;

    for model in &outcome.summaries {
        let mut row = vec![model.model.clone()];
        for category in &categories {
            let cell = outcome
                .category_summaries
                .iter()
                .find(|s| s.model == model.model && s.category == Some(*category))
                .map(|s| format!("{:.3}", s.avg_score))
                .unwrap_or_else(|| "-".to_string());
            row.push(cell);
        }
        writeln!(out, "{}", table_row(&row))?;
    }
    writeln!(out)
}

fn write_leaders(out: &mut impl Write, outcome: &BenchmarkOutcome) -> fmt::Result {
    let leaders = &outcome.comparison.category_leaders;
    if leaders.is_empty() {
        return Ok(());
    }
    writeln!(out, "## Category Leaders")?;
    for leader in leaders {
        match (&leader.runner_up, leader.margin) {
            (Some(runner_up), Some(margin)) => writeln!(
                out,
                "- **{}**: {} ({:.3}, +{:.3} over {})",
                leader.category.label(),
                leader.model,
                leader.avg_score,
                margin,
                runner_up
            )?,
            _ => writeln!(
                out,
                "- **{}**: {} ({:.3})",
                leader.category.label(),
                leader.model,
                leader.avg_score
            )?,
        }
    }
    writeln!(out)
}

fn write_details(out: &mut impl Write, outcome: &BenchmarkOutcome) -> fmt::Result {
    writeln!(out, "## Detailed Results")?;
    writeln!(
        out,
        "{}",
        table_row(&[
            "Task".into(),
            "Model".into(),
            "Category".into(),
            "Status".into(),
            "Score".into(),
            "Latency (ms)".into(),
            "Attempts".into(),
        ])
    )?;
    writeln!(out, "{}", separator(7))?;
    for r in outcome.records.iter().take(DETAIL_ROWS) {
        writeln!(
            out,
            "{}",
            table_row(&[
                r.task_id.clone(),
                r.model.clone(),
                r.category.as_str().to_string(),
                r.status.as_str().to_string(),
                format!("{:.3}", r.correctness),
                r.latency_ms.to_string(),
                r.attempt_count.to_string(),
            ])
        )?;
    }
    if outcome.records.len() > DETAIL_ROWS {
        writeln!(out)?;
        writeln!(
            out,
            "*(Showing first {} of {} results)*",
            DETAIL_ROWS,
            outcome.records.len()
        )?;
    }
    Ok(())
}
