//! LLM Comparator
//!
//! Benchmarks several LLM providers against a fixed battery of tasks, scores
//! every response and aggregates accuracy, latency and cost into a comparison
//! report.
//!
//! # Features
//!
//! - Ten task categories, from coding to long-context stress
//! - Native Anthropic and OpenAI clients plus OpenRouter, Google and Zhipu
//!   through their OpenAI-compatible endpoints
//! - Per-provider admission gates, retries with jittered backoff and a
//!   run-level deadline
//! - Exact-match, regex, JSON-schema (with partial credit), rubric and
//!   LLM-as-judge scoring
//! - Markdown, CSV, JSON and JSONL output, plus a SQLite run history
//!
//! # Example
//!
//! ```no_run
//! use llm_comparator::{config::Config, engine::BenchmarkRun, tasks::TaskCatalog};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default();
//!     let catalog = TaskCatalog::builtin()?.truncate(5);
//!
//!     let outcome = BenchmarkRun::new(config)
//!         .execute(catalog.tasks(), &["gpt-4o-mini", "claude-sonnet-4-5-native"])
//!         .await?;
//!
//!     llm_comparator::reporting::print_console_report(&outcome);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod providers;
pub mod reporting;
pub mod runner;
pub mod tasks;

pub use config::Config;
pub use engine::{BenchmarkOutcome, BenchmarkRun};
pub use error::{BenchError, BenchResult};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{aggregate, GroupBy, ScoreRecord, Scorer, Summary};
    pub use crate::config::Config;
    pub use crate::engine::{BenchmarkOutcome, BenchmarkRun};
    pub use crate::error::{BenchError, BenchResult};
    pub use crate::models::{ModelRegistry, ModelSpec, Pricing};
    pub use crate::providers::{
        CompletionRequest, CompletionResponse, LLMProvider, Message, ProviderError,
        ProviderResult, ProviderSet,
    };
    pub use crate::reporting::{print_console_report, write_reports, JsonSummary};
    pub use crate::runner::{Dispatcher, DispatchConfig, ProviderGates};
    pub use crate::tasks::{Category, Evaluation, RunResult, RunStatus, Task, TaskCatalog};
}
