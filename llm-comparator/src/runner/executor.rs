//! Concurrent dispatcher for (task, model) pairs

use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Instant};

use super::admission::ProviderGates;
use crate::analysis::CompletionChannel;
use crate::config::{BenchmarkConfig, JudgeConfig};
use crate::error::{BenchError, BenchResult};
use crate::models::ModelSpec;
use crate::providers::{CompletionRequest, FailureKind, ProviderError, ProviderSet};
use crate::tasks::{RunResult, RunStatus, Task};

/// Retry budget and backoff shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first
    pub max_retries: u32,
    /// Base delay before the first retry
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with jitter.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed. A
    /// provider-supplied retry-after acts as a floor, still capped at
    /// `max_retry_delay_ms`.
    pub fn delay_for(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let base = self
            .retry_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_retry_delay_ms);
        let jittered = (base as f64 * rand::rng().random_range(0.9..1.1)) as u64;
        let floor = retry_after_ms.unwrap_or(0);
        Duration::from_millis(jittered.max(floor).min(self.max_retry_delay_ms))
    }
}

/// Configuration for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Global ceiling on in-flight provider calls
    pub concurrency_limit: usize,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Wall-clock budget for a whole `run`
    pub run_timeout_ms: Option<u64>,
    pub retry: RetryPolicy,
    /// Retry and timeout settings for judge calls
    pub judge_retry: RetryPolicy,
    pub judge_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 16,
            timeout_ms: 120_000,
            run_timeout_ms: None,
            retry: RetryPolicy::default(),
            judge_retry: RetryPolicy::default(),
            judge_timeout_ms: 60_000,
        }
    }
}

impl DispatchConfig {
    pub fn from_config(benchmark: &BenchmarkConfig, judge: &JudgeConfig) -> Self {
        let retry = RetryPolicy {
            max_retries: benchmark.max_retries,
            retry_delay_ms: benchmark.retry_delay_ms,
            max_retry_delay_ms: benchmark.max_retry_delay_ms,
        };
        Self {
            concurrency_limit: benchmark.concurrency_limit,
            timeout_ms: benchmark.timeout_ms,
            run_timeout_ms: benchmark.run_timeout_ms,
            retry,
            judge_retry: RetryPolicy {
                max_retries: judge.max_retries,
                ..retry
            },
            judge_timeout_ms: judge.timeout_ms,
        }
    }
}

/// Terminal status for an error that will not be retried further
fn status_for(error: &ProviderError) -> RunStatus {
    match error.kind() {
        FailureKind::Timeout => RunStatus::Timeout,
        FailureKind::RateLimit => RunStatus::RateLimited,
        FailureKind::Malformed => RunStatus::MalformedResponse,
        FailureKind::ServerError
        | FailureKind::Auth
        | FailureKind::InvalidRequest
        | FailureKind::ContentPolicy => RunStatus::ProviderError,
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn closed(task_id: &str, model: &ModelSpec, reason: &str, attempts: &AtomicU32) -> RunResult {
    RunResult::failure(
        task_id,
        model,
        RunStatus::ProviderError,
        reason,
        0,
        attempts.load(Ordering::SeqCst),
    )
}

/// Executes every (task, model) pair under global and per-provider limits
pub struct Dispatcher {
    config: DispatchConfig,
    providers: ProviderSet,
    gates: Arc<ProviderGates>,
    global: Arc<Semaphore>,
    progress: Arc<dyn ProgressCallback>,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(providers: ProviderSet, gates: ProviderGates, config: DispatchConfig) -> Self {
        let global = Arc::new(Semaphore::new(config.concurrency_limit.max(1)));
        Self {
            config,
            providers,
            gates: Arc::new(gates),
            global,
            progress: Arc::new(NoOpProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn gates(&self) -> &ProviderGates {
        &self.gates
    }

    /// Run every task against every model.
    ///
    /// Returns exactly one result per pair, ordered task-major. Per-pair
    /// failures are results, never errors; the only error is a model whose
    /// provider has no client.
    pub async fn run(&self, tasks: &[Task], models: &[ModelSpec]) -> BenchResult<Vec<RunResult>> {
        for model in models {
            if !self.providers.contains(&model.resolved_provider) {
                return Err(BenchError::UnsupportedProvider {
                    provider: model.resolved_provider.clone(),
                    model: model.alias.clone(),
                });
            }
        }

        let total = tasks.len() * models.len();
        let deadline = self
            .config
            .run_timeout_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let completed = Arc::new(AtomicUsize::new(0));

        tracing::info!(
            tasks = tasks.len(),
            models = models.len(),
            concurrency = self.config.concurrency_limit,
            "Dispatching {} pairs",
            total
        );

        let mut handles = Vec::with_capacity(total);
        for task in tasks {
            let task = Arc::new(task.clone());
            for model in models {
                let dispatcher = self.clone_for_task();
                let task = task.clone();
                let model = model.clone();
                let completed = completed.clone();
                let pair = (task.id.clone(), model.clone());

                let handle = tokio::spawn(async move {
                    let result = dispatcher.run_pair(&task, &model, deadline).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    dispatcher
                        .progress
                        .on_pair_complete(&task.id, &model.alias, result.status);
                    dispatcher.progress.on_progress(done, total);
                    result
                });
                handles.push((pair, handle));
            }
        }

        let mut results = Vec::with_capacity(total);
        for ((task_id, model), handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!("Pair {} on {} panicked: {}", task_id, model.alias, e);
                    results.push(RunResult::failure(
                        task_id,
                        &model,
                        RunStatus::ProviderError,
                        format!("pair execution panicked: {}", e),
                        0,
                        0,
                    ));
                }
            }
        }

        Ok(results)
    }

    async fn run_pair(&self, task: &Task, model: &ModelSpec, deadline: Option<Instant>) -> RunResult {
        self.progress.on_pair_start(&task.id, &model.alias);
        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let work = self.execute(
            &task.id,
            model,
            task.to_request(model),
            &self.config.retry,
            self.config.timeout_ms,
            &attempts,
        );

        let Some(deadline) = deadline else {
            return work.await;
        };
        match tokio::time::timeout_at(deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                let attempt_count = attempts.load(Ordering::SeqCst);
                tracing::warn!(
                    task = %task.id,
                    model = %model.alias,
                    attempts = attempt_count,
                    "Run deadline exceeded"
                );
                RunResult::failure(
                    &task.id,
                    model,
                    RunStatus::Timeout,
                    "run deadline exceeded",
                    elapsed_ms(started),
                    attempt_count,
                )
            }
        }
    }

    /// Issue a request with retries until it succeeds or is terminal.
    ///
    /// `attempts` counts calls actually issued, so a caller that abandons
    /// this future can still report how far it got.
    async fn execute(
        &self,
        task_id: &str,
        model: &ModelSpec,
        request: CompletionRequest,
        policy: &RetryPolicy,
        timeout_ms: u64,
        attempts: &AtomicU32,
    ) -> RunResult {
        let Some(provider) = self.providers.get(&model.resolved_provider).cloned() else {
            return RunResult::failure(
                task_id,
                model,
                RunStatus::ProviderError,
                format!("no client for provider '{}'", model.resolved_provider),
                0,
                0,
            );
        };
        let gate = self.gates.gate(&model.resolved_provider);
        let timeout = Duration::from_millis(timeout_ms);

        loop {
            let (attempt, latency_ms, outcome) = {
                // Provider slot first, so a saturated provider never pins global slots
                let Some(_slot) = gate.acquire().await else {
                    return closed(task_id, model, "provider gate closed", attempts);
                };
                let Ok(_global) = self.global.clone().acquire_owned().await else {
                    return closed(task_id, model, "dispatcher shut down", attempts);
                };

                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let call_started = Instant::now();
                let outcome = match tokio::time::timeout(timeout, provider.complete(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout { timeout_ms }),
                };
                (attempt, elapsed_ms(call_started), outcome)
            };

            match outcome {
                Ok(response) => {
                    tracing::debug!(
                        task = %task_id,
                        model = %model.alias,
                        attempt,
                        latency_ms,
                        "Completed"
                    );
                    return RunResult::success(
                        task_id,
                        model,
                        response.content,
                        response.usage,
                        latency_ms,
                        attempt,
                    );
                }
                Err(e) if e.is_transient() && attempt <= policy.max_retries => {
                    let delay = policy.delay_for(attempt, e.retry_after_ms());
                    tracing::info!(
                        "Retry {} for task {} on {} in {}ms: {}",
                        attempt,
                        task_id,
                        model.alias,
                        delay.as_millis(),
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    let status = status_for(&e);
                    tracing::warn!(
                        task = %task_id,
                        model = %model.alias,
                        attempt,
                        status = status.as_str(),
                        "Request failed: {}",
                        e
                    );
                    return RunResult::failure(task_id, model, status, e.to_string(), latency_ms, attempt);
                }
            }
        }
    }

    /// Channel for judge calls, sharing this dispatcher's limits
    pub fn judge_channel(&self) -> JudgeChannel {
        JudgeChannel {
            dispatcher: self.clone_for_task(),
        }
    }

    /// Clone the dispatcher for spawning pairs
    fn clone_for_task(&self) -> Self {
        Self {
            config: self.config.clone(),
            providers: self.providers.clone(),
            gates: self.gates.clone(),
            global: self.global.clone(),
            progress: self.progress.clone(),
        }
    }
}

/// Judge requests routed through the dispatcher's admission control
pub struct JudgeChannel {
    dispatcher: Dispatcher,
}

#[async_trait]
impl CompletionChannel for JudgeChannel {
    async fn request(&self, task_id: &str, model: &ModelSpec, request: CompletionRequest) -> RunResult {
        let config = &self.dispatcher.config;
        let attempts = AtomicU32::new(0);
        self.dispatcher
            .execute(
                task_id,
                model,
                request,
                &config.judge_retry,
                config.judge_timeout_ms,
                &attempts,
            )
            .await
    }
}

/// Progress callback for tracking execution
pub trait ProgressCallback: Send + Sync {
    fn on_pair_start(&self, task_id: &str, model: &str);
    fn on_pair_complete(&self, task_id: &str, model: &str, status: RunStatus);
    fn on_progress(&self, completed: usize, total: usize);
}

/// Default no-op progress callback
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_pair_start(&self, _task_id: &str, _model: &str) {}
    fn on_pair_complete(&self, _task_id: &str, _model: &str, _status: RunStatus) {}
    fn on_progress(&self, _completed: usize, _total: usize) {}
}

/// Console progress callback
pub struct ConsoleProgress;

impl ProgressCallback for ConsoleProgress {
    fn on_pair_start(&self, _task_id: &str, _model: &str) {}

    fn on_pair_complete(&self, task_id: &str, model: &str, status: RunStatus) {
        let label = if status == RunStatus::Success { "OK" } else { "FAILED" };
        println!("  {} {} on {} ({})", label, task_id, model, status.as_str());
    }

    fn on_progress(&self, completed: usize, total: usize) {
        if completed == total || completed % 10 == 0 {
            println!("Progress: {}/{} pairs complete", completed, total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Pricing;
    use crate::providers::{CompletionResponse, LLMProvider, ProviderResult};
    use crate::runner::admission::GateLimits;
    use crate::tasks::{Category, TokenUsage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Reply(&'static str),
        RateLimited,
        Unauthorized,
    }

    /// Replays scripted outcomes, then repeats the last one
    struct Scripted {
        name: String,
        script: Mutex<VecDeque<Step>>,
        delay: Duration,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(name: &str, script: Vec<Step>) -> Self {
            Self {
                name: name.to_string(),
                script: Mutex::new(script.into()),
                delay: Duration::ZERO,
                calls: AtomicU32::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl LLMProvider for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = {
                let mut script = self.script.lock().unwrap();
                if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    *script.front().unwrap()
                }
            };
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            match step {
                Step::Reply(text) => Ok(CompletionResponse {
                    content: text.to_string(),
                    model: request.model.clone(),
                    usage: Some(TokenUsage::new(10, 5)),
                    finish_reason: "stop".to_string(),
                }),
                Step::RateLimited => Err(ProviderError::RateLimited { retry_after_ms: None }),
                Step::Unauthorized => Err(ProviderError::Auth {
                    status: 401,
                    message: "bad key".to_string(),
                }),
            }
        }
    }

    fn fast_config() -> DispatchConfig {
        DispatchConfig {
            concurrency_limit: 8,
            timeout_ms: 1_000,
            run_timeout_ms: None,
            retry: RetryPolicy {
                max_retries: 2,
                retry_delay_ms: 1,
                max_retry_delay_ms: 5,
            },
            judge_retry: RetryPolicy {
                max_retries: 0,
                retry_delay_ms: 1,
                max_retry_delay_ms: 5,
            },
            judge_timeout_ms: 1_000,
        }
    }

    fn model(alias: &str, provider: &str) -> ModelSpec {
        ModelSpec::new(alias, provider, alias, Pricing::Unknown)
    }

    fn tasks(n: usize) -> Vec<Task> {
        (0..n)
            .map(|i| Task::exact(format!("t{}", i), Category::Reasoning, "2+2?", "4"))
            .collect()
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            retry_delay_ms: 100,
            max_retry_delay_ms: 1_000,
        };
        let first = policy.delay_for(1, None).as_millis();
        assert!((90..=110).contains(&first), "{}", first);
        let third = policy.delay_for(3, None).as_millis();
        assert!((360..=440).contains(&third), "{}", third);
        assert!(policy.delay_for(10, None).as_millis() <= 1_000);
    }

    #[test]
    fn test_retry_after_is_a_floor() {
        let policy = RetryPolicy {
            max_retries: 2,
            retry_delay_ms: 10,
            max_retry_delay_ms: 5_000,
        };
        assert!(policy.delay_for(1, Some(2_000)).as_millis() >= 2_000);
        assert_eq!(policy.delay_for(1, Some(60_000)).as_millis(), 5_000);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted_on_rate_limit() {
        let provider = Arc::new(Scripted::new("mock", vec![Step::RateLimited]));
        let set = ProviderSet::new().with_provider(provider.clone());
        let dispatcher = Dispatcher::new(set, ProviderGates::new(2), fast_config());

        let results = dispatcher.run(&tasks(1), &[model("m", "mock")]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, RunStatus::RateLimited);
        assert_eq!(results[0].attempt_count, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_error_not_retried() {
        let provider = Arc::new(Scripted::new("mock", vec![Step::Unauthorized]));
        let set = ProviderSet::new().with_provider(provider.clone());
        let dispatcher = Dispatcher::new(set, ProviderGates::new(2), fast_config());

        let results = dispatcher.run(&tasks(1), &[model("m", "mock")]).await.unwrap();
        assert_eq!(results[0].status, RunStatus::ProviderError);
        assert_eq!(results[0].attempt_count, 1);
        assert!(results[0].error_message.as_deref().unwrap().contains("bad key"));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let provider = Arc::new(Scripted::new("mock", vec![Step::RateLimited, Step::Reply("4")]));
        let set = ProviderSet::new().with_provider(provider);
        let dispatcher = Dispatcher::new(set, ProviderGates::new(2), fast_config());

        let results = dispatcher.run(&tasks(1), &[model("m", "mock")]).await.unwrap();
        assert_eq!(results[0].status, RunStatus::Success);
        assert_eq!(results[0].attempt_count, 2);
        assert_eq!(results[0].raw_text.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_per_provider_limit_respected() {
        let slow = Arc::new(Scripted::new("slow", vec![Step::Reply("4")]).with_delay(Duration::from_millis(20)));
        let set = ProviderSet::new().with_provider(slow);
        let gates = ProviderGates::new(4).with_limits(
            "slow",
            GateLimits {
                max_in_flight: 2,
                rpm: None,
            },
        );
        let dispatcher = Dispatcher::new(set, gates, fast_config());

        let results = dispatcher.run(&tasks(8), &[model("m", "slow")]).await.unwrap();
        assert_eq!(results.len(), 8);
        assert!(results.iter().all(|r| r.is_success()));
        assert!(dispatcher.gates().gate("slow").peak_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_attempt_timeout_maps_to_timeout() {
        let hang = Arc::new(Scripted::new("hang", vec![Step::Reply("late")]).with_delay(Duration::from_secs(5)));
        let set = ProviderSet::new().with_provider(hang);
        let mut config = fast_config();
        config.timeout_ms = 20;
        config.retry.max_retries = 1;
        let dispatcher = Dispatcher::new(set, ProviderGates::new(2), config);

        let results = dispatcher.run(&tasks(1), &[model("m", "hang")]).await.unwrap();
        assert_eq!(results[0].status, RunStatus::Timeout);
        assert_eq!(results[0].attempt_count, 2);
    }

    #[tokio::test]
    async fn test_run_deadline_materializes_timeouts() {
        let hang = Arc::new(Scripted::new("hang", vec![Step::Reply("late")]).with_delay(Duration::from_secs(5)));
        let fast = Arc::new(Scripted::new("fast", vec![Step::Reply("4")]));
        let set = ProviderSet::new().with_provider(hang).with_provider(fast);
        let mut config = fast_config();
        config.timeout_ms = 10_000;
        config.run_timeout_ms = Some(100);
        let dispatcher = Dispatcher::new(set, ProviderGates::new(2), config);

        let models = [model("x", "fast"), model("y", "hang")];
        let results = dispatcher.run(&tasks(2), &models).await.unwrap();
        assert_eq!(results.len(), 4);
        for result in &results {
            match result.model.as_str() {
                "x" => assert_eq!(result.status, RunStatus::Success),
                _ => {
                    assert_eq!(result.status, RunStatus::Timeout);
                    assert_eq!(result.attempt_count, 1);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_missing_client_is_config_error() {
        let dispatcher = Dispatcher::new(ProviderSet::new(), ProviderGates::new(2), fast_config());
        let err = dispatcher.run(&tasks(1), &[model("m", "nowhere")]).await.err().unwrap();
        assert!(matches!(err, BenchError::UnsupportedProvider { .. }));
    }

    #[tokio::test]
    async fn test_judge_channel_uses_judge_policy() {
        let provider = Arc::new(Scripted::new("mock", vec![Step::RateLimited]));
        let set = ProviderSet::new().with_provider(provider.clone());
        let dispatcher = Dispatcher::new(set, ProviderGates::new(2), fast_config());

        let channel = dispatcher.judge_channel();
        let request = CompletionRequest::new("judge", vec![], 16);
        let result = channel.request("t0::judge", &model("judge", "mock"), request).await;
        assert_eq!(result.status, RunStatus::RateLimited);
        assert_eq!(result.attempt_count, 1);
    }
}
