//! SQLite history of benchmark runs
//!
//! Every recorded run lands in four tables (`runs`, `tasks`, `results`,
//! `metrics`) keyed by run id, so earlier runs can be listed and compared
//! without re-reading their report files.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::engine::BenchmarkOutcome;
use crate::tasks::PairKey;

/// File name of the history database inside the output directory
pub const DATABASE_FILE: &str = "history.sqlite";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of the `runs` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRun {
    pub run_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub models: String,
    pub judge_model: Option<String>,
    pub total_tasks: u32,
    pub total_pairs: u32,
    pub failed_pairs: u32,
}

/// One row of the `results` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredResult {
    pub task_id: String,
    pub model: String,
    pub provider: String,
    pub category: String,
    pub status: String,
    pub correctness: f64,
    pub raw_output: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub cost_usd: f64,
    pub cost_estimated: bool,
    pub judge_cost_usd: f64,
    pub latency_ms: u64,
    pub attempt_count: u32,
    pub error_message: Option<String>,
}

/// One row of the `metrics` table; `category` is `None` for whole-model rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMetrics {
    pub model: String,
    pub category: Option<String>,
    pub runs: u32,
    pub mean_score: f64,
    pub median_score: f64,
    pub std_dev: f64,
    pub failure_rate: f64,
    pub total_cost_usd: f64,
    pub judge_cost_usd: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    /// Open (creating if needed) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA busy_timeout=5000;",
        )?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA foreign_keys=ON;\
             CREATE TABLE IF NOT EXISTS runs (\
               run_id TEXT PRIMARY KEY,\
               started_at TEXT NOT NULL,\
               completed_at TEXT NOT NULL,\
               models TEXT NOT NULL,\
               judge_model TEXT,\
               total_tasks INTEGER NOT NULL,\
               total_pairs INTEGER NOT NULL,\
               failed_pairs INTEGER NOT NULL\
             );\
             CREATE TABLE IF NOT EXISTS tasks (\
               run_id TEXT NOT NULL REFERENCES runs(run_id) ON DELETE CASCADE,\
               task_id TEXT NOT NULL,\
               category TEXT NOT NULL,\
               evaluation_method TEXT NOT NULL,\
               PRIMARY KEY (run_id, task_id)\
             );\
             CREATE TABLE IF NOT EXISTS results (\
               id INTEGER PRIMARY KEY AUTOINCREMENT,\
               run_id TEXT NOT NULL REFERENCES runs(run_id) ON DELETE CASCADE,\
               task_id TEXT NOT NULL,\
               model TEXT NOT NULL,\
               provider TEXT NOT NULL,\
               category TEXT NOT NULL,\
               status TEXT NOT NULL,\
               correctness REAL NOT NULL,\
               raw_output TEXT,\
               input_tokens INTEGER,\
               output_tokens INTEGER,\
               cost_usd REAL NOT NULL,\
               cost_estimated INTEGER NOT NULL,\
               judge_cost_usd REAL NOT NULL DEFAULT 0,\
               latency_ms INTEGER NOT NULL,\
               attempt_count INTEGER NOT NULL,\
               error_message TEXT\
             );\
             CREATE TABLE IF NOT EXISTS metrics (\
               id INTEGER PRIMARY KEY AUTOINCREMENT,\
               run_id TEXT NOT NULL REFERENCES runs(run_id) ON DELETE CASCADE,\
               model TEXT NOT NULL,\
               category TEXT,\
               runs INTEGER NOT NULL,\
               mean_score REAL NOT NULL,\
               median_score REAL NOT NULL,\
               std_dev REAL NOT NULL,\
               failure_rate REAL NOT NULL,\
               total_cost_usd REAL NOT NULL,\
               judge_cost_usd REAL NOT NULL,\
               avg_latency_ms REAL NOT NULL,\
               p50_latency_ms INTEGER NOT NULL,\
               p95_latency_ms INTEGER NOT NULL,\
               p99_latency_ms INTEGER NOT NULL\
             );\
             CREATE INDEX IF NOT EXISTS idx_results_run ON results(run_id, model);\
             CREATE INDEX IF NOT EXISTS idx_metrics_run ON metrics(run_id, model);",
        )?;
        Ok(Self { conn })
    }

    /// Record a finished run. Recording the same run id again replaces it.
    pub fn record_outcome(&mut self, outcome: &BenchmarkOutcome) -> Result<(), StoreError> {
        let raw_outputs: HashMap<PairKey, &str> = outcome
            .run_results
            .iter()
            .filter_map(|r| Some((PairKey::new(&r.task_id, &r.model), r.raw_text.as_deref()?)))
            .collect();
        let models = outcome
            .models
            .iter()
            .map(|m| m.alias.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let tx = self.conn.transaction()?;
        for table in ["results", "metrics", "tasks", "runs"] {
            tx.execute(&format!("DELETE FROM {} WHERE run_id = ?1", table), params![outcome.run_id])?;
        }
        tx.execute(
            "INSERT INTO runs (run_id, started_at, completed_at, models, judge_model,\
                               total_tasks, total_pairs, failed_pairs)\
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                outcome.run_id,
                outcome.started_at.to_rfc3339(),
                outcome.completed_at.to_rfc3339(),
                models,
                outcome.judge_model,
                outcome.task_count as i64,
                outcome.records.len() as i64,
                outcome.failed_pairs() as i64,
            ],
        )?;

        {
            let mut insert_task = tx.prepare(
                "INSERT OR IGNORE INTO tasks (run_id, task_id, category, evaluation_method)\
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut insert_result = tx.prepare(
                "INSERT INTO results (run_id, task_id, model, provider, category, status,\
                                      correctness, raw_output, input_tokens, output_tokens,\
                                      cost_usd, cost_estimated, judge_cost_usd, latency_ms,\
                                      attempt_count, error_message)\
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )?;
            for r in &outcome.records {
                insert_task.execute(params![
                    outcome.run_id,
                    r.task_id,
                    r.category.as_str(),
                    r.method.as_str(),
                ])?;
                insert_result.execute(params![
                    outcome.run_id,
                    r.task_id,
                    r.model,
                    r.provider,
                    r.category.as_str(),
                    r.status.as_str(),
                    r.correctness,
                    raw_outputs.get(&r.key()).copied(),
                    r.input_tokens,
                    r.output_tokens,
                    r.cost_usd,
                    r.cost_estimated,
                    r.judge_cost_usd,
                    r.latency_ms as i64,
                    r.attempt_count,
                    r.error_message,
                ])?;
            }

            let mut insert_metrics = tx.prepare(
                "INSERT INTO metrics (run_id, model, category, runs, mean_score, median_score,\
                                      std_dev, failure_rate, total_cost_usd, judge_cost_usd,\
                                      avg_latency_ms, p50_latency_ms, p95_latency_ms, p99_latency_ms)\
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            for s in outcome.summaries.iter().chain(&outcome.category_summaries) {
                insert_metrics.execute(params![
                    outcome.run_id,
                    s.model,
                    s.category.map(|c| c.as_str()),
                    s.runs as i64,
                    s.avg_score,
                    s.median_score,
                    s.score_std_dev,
                    1.0 - s.success_rate,
                    s.total_cost_usd,
                    s.total_judge_cost_usd,
                    s.avg_latency_ms,
                    s.p50_latency_ms as i64,
                    s.p95_latency_ms as i64,
                    s.p99_latency_ms as i64,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(run = %outcome.run_id, pairs = outcome.records.len(), "Recorded run history");
        Ok(())
    }

    /// All recorded runs, newest first
    pub fn runs(&self) -> Result<Vec<StoredRun>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY completed_at DESC, run_id DESC",
            RUN_COLUMNS
        ))?;
        let rows = stmt.query_map([], stored_run)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn run(&self, run_id: &str) -> Result<Option<StoredRun>, StoreError> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE run_id = ?1", RUN_COLUMNS),
                params![run_id],
                stored_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Results of one run in the order they were recorded
    pub fn results_for_run(&self, run_id: &str) -> Result<Vec<StoredResult>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, model, provider, category, status, correctness, raw_output,\
                    input_tokens, output_tokens, cost_usd, cost_estimated, judge_cost_usd,\
                    latency_ms, attempt_count, error_message \
             FROM results WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(StoredResult {
                task_id: row.get(0)?,
                model: row.get(1)?,
                provider: row.get(2)?,
                category: row.get(3)?,
                status: row.get(4)?,
                correctness: row.get(5)?,
                raw_output: row.get(6)?,
                input_tokens: row.get(7)?,
                output_tokens: row.get(8)?,
                cost_usd: row.get(9)?,
                cost_estimated: row.get(10)?,
                judge_cost_usd: row.get(11)?,
                latency_ms: row.get::<_, i64>(12)?.max(0) as u64,
                attempt_count: row.get(13)?,
                error_message: row.get(14)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Metrics of one run: whole-model rows first, then per-category rows
    pub fn metrics_for_run(&self, run_id: &str) -> Result<Vec<StoredMetrics>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT model, category, runs, mean_score, median_score, std_dev, failure_rate,\
                    total_cost_usd, judge_cost_usd, avg_latency_ms,\
                    p50_latency_ms, p95_latency_ms, p99_latency_ms \
             FROM metrics WHERE run_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(StoredMetrics {
                model: row.get(0)?,
                category: row.get(1)?,
                runs: row.get(2)?,
                mean_score: row.get(3)?,
                median_score: row.get(4)?,
                std_dev: row.get(5)?,
                failure_rate: row.get(6)?,
                total_cost_usd: row.get(7)?,
                judge_cost_usd: row.get(8)?,
                avg_latency_ms: row.get(9)?,
                p50_latency_ms: row.get::<_, i64>(10)?.max(0) as u64,
                p95_latency_ms: row.get::<_, i64>(11)?.max(0) as u64,
                p99_latency_ms: row.get::<_, i64>(12)?.max(0) as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Number of distinct tasks recorded for a run
    pub fn task_count(&self, run_id: &str) -> Result<u32, StoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

const RUN_COLUMNS: &str = "run_id, started_at, completed_at, models, judge_model, \
                           total_tasks, total_pairs, failed_pairs";

fn stored_run(row: &Row<'_>) -> rusqlite::Result<StoredRun> {
    Ok(StoredRun {
        run_id: row.get(0)?,
        started_at: row.get(1)?,
        completed_at: row.get(2)?,
        models: row.get(3)?,
        judge_model: row.get(4)?,
        total_tasks: row.get(5)?,
        total_pairs: row.get(6)?,
        failed_pairs: row.get(7)?,
    })
}
