//! Run-aborting error types
//!
//! Everything below a configuration failure is absorbed into the data model
//! (`RunResult::status`, `ScoreRecord` fields). `BenchError` is the only error
//! a benchmark run hands back to its caller.

use crate::config::ConfigError;
use crate::tasks::LoadError;

/// Errors that prevent a run from producing meaningful data at all
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("unknown model alias '{alias}' and gateway fallback is disabled")]
    UnknownModel { alias: String },

    #[error("missing credential for provider '{provider}': set {env_var}")]
    MissingCredential { provider: String, env_var: String },

    #[error("no client configured for provider '{provider}' (needed by model '{model}')")]
    UnsupportedProvider { provider: String, model: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("task catalog error: {0}")]
    Catalog(#[from] LoadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BenchResult<T> = Result<T, BenchError>;
