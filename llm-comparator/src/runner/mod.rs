//! Benchmark execution engine

pub mod admission;
pub mod executor;
pub mod rate_limiter;

pub use admission::{GateLimits, ProviderGate, ProviderGates};
pub use executor::{
    ConsoleProgress, DispatchConfig, Dispatcher, JudgeChannel, NoOpProgress, ProgressCallback,
    RetryPolicy,
};
pub use rate_limiter::RateLimiter;
