//! End-to-end benchmark run: resolve, dispatch, score, aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::analysis::{
    aggregate, compare, ComparisonReport, GroupBy, JudgeSettings, ScoreRecord, Scorer, Summary,
};
use crate::config::Config;
use crate::error::{BenchError, BenchResult};
use crate::models::{ModelRegistry, ModelSpec};
use crate::providers::ProviderSet;
use crate::runner::{DispatchConfig, Dispatcher, NoOpProgress, ProgressCallback, ProviderGates};
use crate::tasks::{EvaluationMethod, RunResult, Task};

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkOutcome {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub models: Vec<ModelSpec>,
    /// Judge model alias, when any judged task was part of the run
    pub judge_model: Option<String>,
    pub task_count: usize,
    pub run_results: Vec<RunResult>,
    pub records: Vec<ScoreRecord>,
    /// Per model, descending `avg_score`
    pub summaries: Vec<Summary>,
    /// Per (model, category), descending `avg_score`
    pub category_summaries: Vec<Summary>,
    pub comparison: ComparisonReport,
}

impl BenchmarkOutcome {
    /// Pairs whose every attempt failed
    pub fn failed_pairs(&self) -> usize {
        self.records.iter().filter(|r| !r.is_success()).count()
    }
}

/// A configured benchmark run
pub struct BenchmarkRun {
    config: Config,
    registry: ModelRegistry,
    providers: Option<ProviderSet>,
    progress: Arc<dyn ProgressCallback>,
}

impl BenchmarkRun {
    pub fn new(config: Config) -> Self {
        let registry = ModelRegistry::from_config(&config);
        Self {
            config,
            registry,
            providers: None,
            progress: Arc::new(NoOpProgress),
        }
    }

    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use these clients instead of building them from config and environment
    pub fn with_providers(mut self, providers: ProviderSet) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Run `tasks` against every alias in `aliases`.
    ///
    /// Errors only on configuration failures; every pair otherwise yields
    /// exactly one run result and one score record.
    pub async fn execute<S: AsRef<str>>(&self, tasks: &[Task], aliases: &[S]) -> BenchResult<BenchmarkOutcome> {
        let started_at = Utc::now();
        let run_id = started_at.format("%Y%m%d-%H%M%S").to_string();

        let models = self.registry.resolve_all(aliases)?;
        if models.is_empty() {
            return Err(BenchError::Invalid("no models selected".to_string()));
        }
        if tasks.is_empty() {
            return Err(BenchError::Invalid("no tasks selected".to_string()));
        }

        let judge = if tasks.iter().any(|t| t.method() == EvaluationMethod::LlmJudge) {
            Some(self.registry.resolve(&self.config.judge.model)?)
        } else {
            None
        };

        let mut needed = models.clone();
        needed.extend(judge.iter().cloned());
        let providers = match &self.providers {
            Some(providers) => providers.clone(),
            None => ProviderSet::for_models(&self.config, &needed)?,
        };
        for spec in &needed {
            if !providers.contains(&spec.resolved_provider) {
                return Err(BenchError::UnsupportedProvider {
                    provider: spec.resolved_provider.clone(),
                    model: spec.alias.clone(),
                });
            }
        }

        tracing::info!(
            run_id = %run_id,
            tasks = tasks.len(),
            models = models.len(),
            judge = judge.as_ref().map(|j| j.alias.as_str()).unwrap_or("none"),
            "Starting benchmark run"
        );

        let dispatcher = Dispatcher::new(
            providers,
            ProviderGates::from_config(&self.config),
            DispatchConfig::from_config(&self.config.benchmark, &self.config.judge),
        )
        .with_progress(self.progress.clone());

        let run_results = dispatcher.run(tasks, &models).await?;

        let mut scorer = Scorer::new(&models, self.registry.cost_precision())
            .with_schema_weights(self.config.scoring.schema_weights.clone());
        if let Some(judge) = &judge {
            scorer = scorer.with_judge(
                Arc::new(dispatcher.judge_channel()),
                JudgeSettings::from_config(judge.clone(), &self.config.judge),
            );
        }
        let records = score_all(&scorer, tasks, &run_results).await;

        debug_assert_eq!(run_results.len(), tasks.len() * models.len());
        debug_assert_eq!(records.len(), run_results.len());

        let summaries = aggregate(&records, GroupBy::ModelOnly);
        let category_summaries = aggregate(&records, GroupBy::ModelAndCategory);
        let comparison = compare(&records);

        let completed_at = Utc::now();
        tracing::info!(
            run_id = %run_id,
            pairs = records.len(),
            failed = records.iter().filter(|r| !r.is_success()).count(),
            "Benchmark run complete in {}s",
            (completed_at - started_at).num_seconds()
        );

        Ok(BenchmarkOutcome {
            run_id,
            started_at,
            completed_at,
            models,
            judge_model: judge.map(|j| j.alias),
            task_count: tasks.len(),
            run_results,
            records,
            summaries,
            category_summaries,
            comparison,
        })
    }
}

/// Score every result concurrently, keeping result order
pub async fn score_all(scorer: &Scorer, tasks: &[Task], results: &[RunResult]) -> Vec<ScoreRecord> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut handles = Vec::with_capacity(results.len());
    for result in results {
        let Some(&task) = by_id.get(result.task_id.as_str()) else {
            tracing::error!("Run result for unknown task {}", result.task_id);
            continue;
        };
        let scorer_for_task = scorer.clone();
        let owned_task = task.clone();
        let owned_result = result.clone();
        let handle = tokio::spawn(async move { scorer_for_task.score(&owned_task, &owned_result).await });
        handles.push((task, result, handle));
    }

    let mut records = Vec::with_capacity(handles.len());
    for (task, result, handle) in handles {
        match handle.await {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::error!("Scoring {} on {} panicked: {}", result.task_id, result.model, e);
                records.push(scorer.score_offline(task, result));
            }
        }
    }
    records
}
