//! LLM Provider implementations

pub mod anthropic;
pub mod openai;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use openai::{OpenAIClient, Preset};
pub use traits::{
    CompletionRequest, CompletionResponse, FailureKind, LLMProvider, Message, ProviderError,
    ProviderResult,
};

use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{BenchError, BenchResult};
use crate::models::ModelSpec;

/// Provider clients keyed by provider id
#[derive(Clone, Default)]
pub struct ProviderSet {
    clients: IndexMap<String, Arc<dyn LLMProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under its own `name()`
    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.insert(provider);
        self
    }

    pub fn insert(&mut self, provider: Arc<dyn LLMProvider>) {
        self.clients.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, provider: &str) -> Option<&Arc<dyn LLMProvider>> {
        self.clients.get(provider)
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.clients.contains_key(provider)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Build clients for every provider the given models resolve to.
    ///
    /// A provider with no readable credential is a configuration failure.
    pub fn for_models(config: &Config, models: &[ModelSpec]) -> BenchResult<Self> {
        let mut set = Self::new();
        for spec in models {
            if set.contains(&spec.resolved_provider) {
                continue;
            }
            let client = build_client(config, &spec.resolved_provider, &spec.alias)?;
            set.insert(client);
        }
        Ok(set)
    }
}

fn build_client(config: &Config, provider: &str, model: &str) -> BenchResult<Arc<dyn LLMProvider>> {
    let pc = config.get_provider(provider);
    if let Some(pc) = pc {
        if !pc.enabled {
            return Err(BenchError::Invalid(format!(
                "provider '{}' is disabled but model '{}' resolves to it",
                provider, model
            )));
        }
    }

    let preset = Preset::from_id(provider);
    let is_anthropic = provider.eq_ignore_ascii_case("anthropic");
    if preset.is_none() && !is_anthropic {
        return Err(BenchError::UnsupportedProvider {
            provider: provider.to_string(),
            model: model.to_string(),
        });
    }

    let env_var = match (pc, preset) {
        (Some(pc), _) => pc.api_key_env.clone(),
        (None, Some(preset)) => preset.api_key_env().to_string(),
        (None, None) => "ANTHROPIC_API_KEY".to_string(),
    };
    let api_key = std::env::var(&env_var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| BenchError::MissingCredential {
            provider: provider.to_string(),
            env_var: env_var.clone(),
        })?;

    let base_url = pc.and_then(|pc| pc.base_url.clone());
    let timeout = client_timeout(config);

    tracing::debug!("Configuring provider {} (key from {})", provider, env_var);

    let client: Arc<dyn LLMProvider> = match preset {
        Some(preset) => {
            let mut client = OpenAIClient::for_preset(preset, api_key).with_timeout(timeout);
            if let Some(url) = base_url {
                client = client.with_base_url(url);
            }
            Arc::new(client.with_name(provider))
        }
        None => {
            let mut client = AnthropicClient::new(api_key).with_timeout(timeout);
            if let Some(url) = base_url {
                client = client.with_base_url(url);
            }
            Arc::new(client)
        }
    };
    Ok(client)
}

/// Candidate and judge calls share one client; the dispatcher enforces
/// each call's own deadline.
fn client_timeout(config: &Config) -> Duration {
    Duration::from_millis(config.benchmark.timeout_ms.max(config.judge.timeout_ms))
}
