//! Configuration management for the comparison suite
//!
//! Loads provider, model registry, dispatch and judge settings from TOML files
//! and provides runtime access.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::SchemaWeights;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    #[serde(default)]
    pub models: IndexMap<String, ModelConfig>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Named model lists, selectable with `--profile`
    #[serde(default)]
    pub profiles: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Override for the provider's API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Requests per minute (sliding window); unset means unlimited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<u32>,
    /// In-flight request ceiling; falls back to `benchmark.per_provider_limit`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_in_flight: Option<usize>,
}

/// A model registry entry, keyed by alias
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    /// USD per million input tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_price_per_million: Option<f64>,
    /// USD per million output tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_price_per_million: Option<f64>,
}

/// Unified gateway routing for aliases missing from the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_provider")]
    pub provider: String,
    #[serde(default = "default_true")]
    pub allow_fallback: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: default_gateway_provider(),
            allow_fallback: true,
        }
    }
}

/// Benchmark execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Global ceiling on in-flight provider calls
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Default in-flight ceiling per resolved provider
    #[serde(default = "default_per_provider_limit")]
    pub per_provider_limit: usize,
    /// Per-attempt timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Wall-clock budget for the whole run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_ms: Option<u64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// Decimal places kept on per-record USD cost
    #[serde(default = "default_cost_precision")]
    pub cost_precision: u32,
}

/// LLM-as-judge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Model alias, resolved through the registry like any benchmarked model
    #[serde(default = "default_judge_model")]
    pub model: String,
    #[serde(default = "default_judge_temperature")]
    pub temperature: f32,
    #[serde(default = "default_judge_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_judge_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_judge_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: default_judge_model(),
            temperature: default_judge_temperature(),
            max_tokens: default_judge_max_tokens(),
            max_retries: default_judge_max_retries(),
            timeout_ms: default_judge_timeout_ms(),
        }
    }
}

/// Scoring knobs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub schema_weights: SchemaWeights,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub save_responses: bool,
    #[serde(default = "default_true")]
    pub markdown: bool,
    #[serde(default = "default_true")]
    pub csv: bool,
    #[serde(default = "default_true")]
    pub json: bool,
    #[serde(default = "default_true")]
    pub jsonl: bool,
    /// Record every run into the SQLite history in `output_dir`
    #[serde(default = "default_true")]
    pub sqlite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            save_responses: false,
            markdown: true,
            csv: true,
            json: true,
            jsonl: true,
            sqlite: true,
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_gateway_provider() -> String { "openrouter".to_string() }
fn default_concurrency_limit() -> usize { 16 }
fn default_per_provider_limit() -> usize { 4 }
fn default_timeout_ms() -> u64 { 120_000 }
fn default_max_retries() -> u32 { 2 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_max_retry_delay_ms() -> u64 { 60_000 }
fn default_cost_precision() -> u32 { 6 }
fn default_judge_model() -> String { "gpt-4o-mini".to_string() }
fn default_judge_temperature() -> f32 { 0.3 }
fn default_judge_max_tokens() -> u32 { 1024 }
fn default_judge_max_retries() -> u32 { 2 }
fn default_judge_timeout_ms() -> u64 { 60_000 }
fn default_output_dir() -> String { "results/reports".to_string() }

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            per_provider_limit: default_per_provider_limit(),
            timeout_ms: default_timeout_ms(),
            run_timeout_ms: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            cost_precision: default_cost_precision(),
        }
    }
}

/// Locations searched when no `--config` path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "config/models.toml",
    "llm-comparator/config/models.toml",
    "../config/models.toml",
];

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit file, or fall back to the default locations
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let config = Self::from_file(path)?;
                tracing::info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => Ok(Self::load_or_default()),
        }
    }

    /// Load from default config location or return defaults
    pub fn load_or_default() -> Self {
        for path in DEFAULT_CONFIG_PATHS {
            if !Path::new(path).exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path);
                    return config;
                }
                Err(e) => tracing::warn!("Ignoring {}: {}", path, e),
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Reject settings that would make a run meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.benchmark;
        if b.concurrency_limit == 0 {
            return Err(ConfigError::Invalid("benchmark.concurrency_limit must be > 0".into()));
        }
        if b.per_provider_limit == 0 {
            return Err(ConfigError::Invalid("benchmark.per_provider_limit must be > 0".into()));
        }
        if b.timeout_ms == 0 {
            return Err(ConfigError::Invalid("benchmark.timeout_ms must be > 0".into()));
        }

        for (name, provider) in &self.providers {
            if provider.max_in_flight == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "providers.{}.max_in_flight must be > 0",
                    name
                )));
            }
            if provider.rpm == Some(0) {
                return Err(ConfigError::Invalid(format!("providers.{}.rpm must be > 0", name)));
            }
        }

        for (alias, model) in &self.models {
            for price in [model.input_price_per_million, model.output_price_per_million]
                .into_iter()
                .flatten()
            {
                if !price.is_finite() || price < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "models.{}: prices must be finite and non-negative",
                        alias
                    )));
                }
            }
            if !self.providers.contains_key(&model.provider) {
                return Err(ConfigError::Invalid(format!(
                    "models.{}: unknown provider '{}'",
                    alias, model.provider
                )));
            }
        }

        if !self.scoring.schema_weights.is_valid() {
            return Err(ConfigError::Invalid(
                "scoring.schema_weights must be non-negative with a positive sum".into(),
            ));
        }

        if self.judge.max_tokens == 0 {
            return Err(ConfigError::Invalid("judge.max_tokens must be > 0".into()));
        }

        Ok(())
    }

    /// Get a specific provider config
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Look up a named model list
    pub fn profile(&self, name: &str) -> Result<&[String], ConfigError> {
        self.profiles
            .get(name)
            .map(|v| v.as_slice())
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    /// Output directory as a path
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output.output_dir)
    }
}

fn provider(api_key_env: &str, rpm: Option<u32>, max_in_flight: Option<usize>) -> ProviderConfig {
    ProviderConfig {
        enabled: true,
        api_key_env: api_key_env.to_string(),
        base_url: None,
        rpm,
        max_in_flight,
    }
}

fn model(
    provider: &str,
    model_id: &str,
    display_name: &str,
    prices: Option<(f64, f64)>,
) -> ModelConfig {
    ModelConfig {
        provider: provider.to_string(),
        model_id: model_id.to_string(),
        display_name: display_name.to_string(),
        input_price_per_million: prices.map(|p| p.0),
        output_price_per_million: prices.map(|p| p.1),
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = IndexMap::new();
        providers.insert("anthropic".to_string(), provider("ANTHROPIC_API_KEY", Some(1_000), Some(4)));
        providers.insert("openai".to_string(), provider("OPENAI_API_KEY", Some(500), Some(4)));
        providers.insert("openrouter".to_string(), provider("OPENROUTER_API_KEY", Some(200), Some(8)));
        providers.insert("google".to_string(), provider("GOOGLE_API_KEY", Some(300), Some(4)));
        providers.insert("zhipuai".to_string(), provider("ZHIPU_API_KEY", Some(100), Some(2)));

        let mut models = IndexMap::new();
        models.insert(
            "claude-sonnet-4-5-native".to_string(),
            model("anthropic", "claude-sonnet-4-5-20250929", "Claude Sonnet 4.5", Some((3.0, 15.0))),
        );
        models.insert(
            "claude-sonnet-4-5-or".to_string(),
            model("openrouter", "anthropic/claude-sonnet-4.5", "Claude Sonnet 4.5 (OpenRouter)", Some((3.0, 15.0))),
        );
        models.insert(
            "gpt-4o-native".to_string(),
            model("openai", "gpt-4o", "GPT-4o", Some((2.5, 10.0))),
        );
        models.insert(
            "gpt-4o-mini".to_string(),
            model("openai", "gpt-4o-mini", "GPT-4o mini", Some((0.15, 0.6))),
        );
        models.insert(
            "gemini-2.5-pro-native".to_string(),
            model("google", "gemini-2.5-pro", "Gemini 2.5 Pro", Some((1.25, 10.0))),
        );
        models.insert(
            "glm-4.6-native".to_string(),
            model("zhipuai", "glm-4.6", "GLM-4.6", None),
        );

        let mut profiles = IndexMap::new();
        profiles.insert(
            "quick".to_string(),
            vec!["gpt-4o-mini".to_string(), "claude-sonnet-4-5-native".to_string()],
        );
        profiles.insert(
            "flagship".to_string(),
            vec![
                "claude-sonnet-4-5-native".to_string(),
                "gpt-4o-native".to_string(),
                "gemini-2.5-pro-native".to_string(),
            ],
        );

        Self {
            providers,
            models,
            gateway: GatewayConfig::default(),
            benchmark: BenchmarkConfig::default(),
            judge: JudgeConfig::default(),
            scoring: ScoringConfig::default(),
            profiles,
            output: OutputConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
}
