//! Model alias resolution and pricing lookup

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{BenchError, BenchResult};

/// USD pricing for a model, per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pricing {
    PerMillion {
        input_price_per_million: f64,
        output_price_per_million: f64,
    },
    Unknown,
}

impl Pricing {
    pub fn per_million(input: f64, output: f64) -> Self {
        Pricing::PerMillion {
            input_price_per_million: input,
            output_price_per_million: output,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Pricing::PerMillion { .. })
    }
}

/// A benchmarked model after alias resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub alias: String,
    /// Native provider id, or the gateway id for unregistered aliases
    pub resolved_provider: String,
    pub resolved_model_id: String,
    pub pricing: Pricing,
}

impl ModelSpec {
    pub fn new(
        alias: impl Into<String>,
        provider: impl Into<String>,
        model_id: impl Into<String>,
        pricing: Pricing,
    ) -> Self {
        Self {
            alias: alias.into(),
            resolved_provider: provider.into(),
            resolved_model_id: model_id.into(),
            pricing,
        }
    }
}

#[derive(Debug, Clone)]
struct RegistryEntry {
    alias: String,
    provider: String,
    model_id: String,
    pricing: Pricing,
}

/// Local model registry: aliases, routing and prices
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<RegistryEntry>,
    gateway_provider: String,
    allow_gateway_fallback: bool,
    cost_precision: u32,
}

impl ModelRegistry {
    /// Build the registry from the `[models]` and `[gateway]` sections
    pub fn from_config(config: &Config) -> Self {
        let entries = config
            .models
            .iter()
            .map(|(alias, m)| RegistryEntry {
                alias: alias.clone(),
                provider: m.provider.clone(),
                model_id: m.model_id.clone(),
                pricing: match (m.input_price_per_million, m.output_price_per_million) {
                    (Some(input), Some(output)) => Pricing::per_million(input, output),
                    _ => Pricing::Unknown,
                },
            })
            .collect();

        Self {
            entries,
            gateway_provider: config.gateway.provider.clone(),
            allow_gateway_fallback: config.gateway.allow_fallback,
            cost_precision: config.benchmark.cost_precision,
        }
    }

    /// Registry with no entries; every alias routes through the gateway
    pub fn empty(gateway_provider: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            gateway_provider: gateway_provider.into(),
            allow_gateway_fallback: true,
            cost_precision: 6,
        }
    }

    /// Register (or replace) an alias
    pub fn with_model(
        mut self,
        alias: impl Into<String>,
        provider: impl Into<String>,
        model_id: impl Into<String>,
        pricing: Pricing,
    ) -> Self {
        let alias = alias.into();
        self.entries.retain(|e| e.alias != alias);
        self.entries.push(RegistryEntry {
            alias,
            provider: provider.into(),
            model_id: model_id.into(),
            pricing,
        });
        self
    }

    pub fn without_gateway_fallback(mut self) -> Self {
        self.allow_gateway_fallback = false;
        self
    }

    /// Decimal places kept on computed costs
    pub fn cost_precision(&self) -> u32 {
        self.cost_precision
    }

    pub fn gateway_provider(&self) -> &str {
        &self.gateway_provider
    }

    /// Resolve an alias to a `ModelSpec`.
    ///
    /// Matches a registered alias first, then a registered model id. Anything
    /// else routes to the unified gateway with the alias used verbatim as the
    /// upstream model id.
    pub fn resolve(&self, alias: &str) -> BenchResult<ModelSpec> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.alias == alias)
            .or_else(|| self.entries.iter().find(|e| e.model_id == alias));

        if let Some(entry) = entry {
            return Ok(ModelSpec::new(alias, &entry.provider, &entry.model_id, entry.pricing));
        }

        if !self.allow_gateway_fallback {
            return Err(BenchError::UnknownModel {
                alias: alias.to_string(),
            });
        }

        tracing::info!(
            "Model {} not found in registry, routing through {}",
            alias,
            self.gateway_provider
        );
        Ok(ModelSpec::new(
            alias,
            &self.gateway_provider,
            alias,
            self.price_for(alias),
        ))
    }

    /// Resolve a list of aliases, dropping duplicates while keeping order
    pub fn resolve_all<S: AsRef<str>>(&self, aliases: &[S]) -> BenchResult<Vec<ModelSpec>> {
        let mut specs: Vec<ModelSpec> = Vec::new();
        for alias in aliases {
            let alias = alias.as_ref().trim();
            if alias.is_empty() || specs.iter().any(|s| s.alias == alias) {
                continue;
            }
            specs.push(self.resolve(alias)?);
        }
        Ok(specs)
    }

    /// Pricing for an upstream model id
    pub fn price_for(&self, model_id: &str) -> Pricing {
        self.entries
            .iter()
            .find(|e| e.model_id == model_id)
            .map(|e| e.pricing)
            .unwrap_or(Pricing::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry {
        ModelRegistry::empty("openrouter")
            .with_model("gpt-4o-native", "openai", "gpt-4o", Pricing::per_million(2.5, 10.0))
            .with_model(
                "sonnet-or",
                "openrouter",
                "anthropic/claude-sonnet-4.5",
                Pricing::per_million(3.0, 15.0),
            )
    }

    #[test]
    fn test_resolve_registered_alias() {
        let spec = registry().resolve("gpt-4o-native").unwrap();
        assert_eq!(spec.resolved_provider, "openai");
        assert_eq!(spec.resolved_model_id, "gpt-4o");
        assert!(spec.pricing.is_known());
    }

    #[test]
    fn test_resolve_by_model_id() {
        let spec = registry().resolve("gpt-4o").unwrap();
        assert_eq!(spec.alias, "gpt-4o");
        assert_eq!(spec.resolved_provider, "openai");
    }

    #[test]
    fn test_unknown_alias_routes_to_gateway_verbatim() {
        let spec = registry().resolve("mistralai/mistral-large").unwrap();
        assert_eq!(spec.resolved_provider, "openrouter");
        assert_eq!(spec.resolved_model_id, "mistralai/mistral-large");
        assert_eq!(spec.pricing, Pricing::Unknown);
    }

    #[test]
    fn test_unknown_alias_without_fallback_is_config_error() {
        let err = registry().without_gateway_fallback().resolve("nope").unwrap_err();
        assert!(matches!(err, BenchError::UnknownModel { .. }));
    }

    #[test]
    fn test_resolve_all_dedupes() {
        let specs = registry()
            .resolve_all(&["gpt-4o-native", " gpt-4o-native", "sonnet-or", ""])
            .unwrap();
        let aliases: Vec<_> = specs.iter().map(|s| s.alias.as_str()).collect();
        assert_eq!(aliases, ["gpt-4o-native", "sonnet-or"]);
    }

    #[test]
    fn test_default_config_registry() {
        let registry = ModelRegistry::from_config(&Config::default());
        let glm = registry.resolve("glm-4.6-native").unwrap();
        assert_eq!(glm.pricing, Pricing::Unknown);
        assert_eq!(registry.cost_precision(), 6);
    }
}
