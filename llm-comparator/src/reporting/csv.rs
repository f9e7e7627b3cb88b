//! CSV export of raw score records

use crate::analysis::ScoreRecord;

const HEADER: &[&str] = &[
    "task_id",
    "model",
    "provider",
    "category",
    "method",
    "status",
    "correctness",
    "cost_usd",
    "cost_estimated",
    "latency_ms",
    "attempt_count",
    "input_tokens",
    "output_tokens",
    "judge_rationale",
    "judge_calls",
    "judge_cost_usd",
    "diagnostic",
    "error_message",
];

/// Quote a field when it contains a delimiter, quote or line break
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Render records as RFC 4180 CSV with a header row
pub fn records_to_csv(records: &[ScoreRecord]) -> String {
    let mut out = HEADER.join(",");
    out.push('\n');

    for r in records {
        let row = [
            escape(&r.task_id),
            escape(&r.model),
            escape(&r.provider),
            r.category.as_str().to_string(),
            r.method.as_str().to_string(),
            r.status.as_str().to_string(),
            format!("{:.4}", r.correctness),
            r.cost_usd.to_string(),
            r.cost_estimated.to_string(),
            r.latency_ms.to_string(),
            r.attempt_count.to_string(),
            optional(r.input_tokens),
            optional(r.output_tokens),
            escape(&r.judge_rationale),
            r.judge_calls.to_string(),
            r.judge_cost_usd.to_string(),
            escape(r.diagnostic.as_deref().unwrap_or("")),
            escape(r.error_message.as_deref().unwrap_or("")),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{Category, EvaluationMethod, RunStatus};

    #[test]
    fn test_csv_escaping() {
        let record = ScoreRecord {
            task_id: "sum_01".to_string(),
            model: "gpt-4o".to_string(),
            provider: "openai".to_string(),
            category: Category::Summarization,
            method: EvaluationMethod::LlmJudge,
            status: RunStatus::Success,
            correctness: 0.75,
            cost_usd: 0.0012,
            cost_estimated: true,
            latency_ms: 812,
            attempt_count: 1,
            input_tokens: Some(120),
            output_tokens: Some(40),
            judge_rationale: "Clear, but says \"maybe\"".to_string(),
            judge_calls: 0,
            judge_cost_usd: 0.0,
            diagnostic: None,
            error_message: None,
        };
        let csv = records_to_csv(&[record]);
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("task_id,model,provider"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("sum_01,gpt-4o,openai,summarization,llm_judge,success,0.7500,"));
        assert!(row.contains(",\"Clear, but says \"\"maybe\"\"\","));
    }
}
