//! Per-provider admission gates
//!
//! Each resolved provider gets its own bounded in-flight semaphore and an
//! optional requests-per-minute window, so one slow or throttled provider
//! cannot starve or flood the others.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::rate_limiter::RateLimiter;
use crate::config::Config;

/// Limits applied to one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateLimits {
    pub max_in_flight: usize,
    pub rpm: Option<u32>,
}

/// Admission gate for a single provider
#[derive(Debug)]
pub struct ProviderGate {
    semaphore: Arc<Semaphore>,
    limits: GateLimits,
    limiter: Option<RateLimiter>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// Held while a request is in flight; releases the slot on drop
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ProviderGate {
    pub fn new(limits: GateLimits) -> Self {
        let max_in_flight = limits.max_in_flight.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            limits: GateLimits {
                max_in_flight,
                rpm: limits.rpm,
            },
            limiter: limits.rpm.map(RateLimiter::new),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn limits(&self) -> GateLimits {
        self.limits
    }

    /// Wait for an in-flight slot and, if configured, room in the RPM window
    pub async fn acquire(&self) -> Option<GatePermit> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Some(GatePermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest concurrent in-flight count observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Gates for every provider a run touches
#[derive(Debug)]
pub struct ProviderGates {
    default_limits: GateLimits,
    overrides: IndexMap<String, GateLimits>,
    // Guards the map only; never held across an await
    gates: Mutex<HashMap<String, Arc<ProviderGate>>>,
}

impl ProviderGates {
    pub fn new(per_provider_limit: usize) -> Self {
        Self {
            default_limits: GateLimits {
                max_in_flight: per_provider_limit,
                rpm: None,
            },
            overrides: IndexMap::new(),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Default limit from `[benchmark]`, per-provider overrides from `[providers]`
    pub fn from_config(config: &Config) -> Self {
        let mut gates = Self::new(config.benchmark.per_provider_limit);
        for (name, pc) in &config.providers {
            gates = gates.with_limits(
                name,
                GateLimits {
                    max_in_flight: pc.max_in_flight.unwrap_or(config.benchmark.per_provider_limit),
                    rpm: pc.rpm,
                },
            );
        }
        gates
    }

    pub fn with_limits(mut self, provider: impl Into<String>, limits: GateLimits) -> Self {
        self.overrides.insert(provider.into(), limits);
        self
    }

    /// The gate for a provider, created on first use
    pub fn gate(&self, provider: &str) -> Arc<ProviderGate> {
        let mut gates = match self.gates.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        gates
            .entry(provider.to_string())
            .or_insert_with(|| {
                let limits = self
                    .overrides
                    .get(provider)
                    .copied()
                    .unwrap_or(self.default_limits);
                Arc::new(ProviderGate::new(limits))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_gate_bounds_in_flight() {
        let gate = Arc::new(ProviderGate::new(GateLimits {
            max_in_flight: 2,
            rpm: None,
        }));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(gate.peak_in_flight(), 2);
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn test_overrides_and_defaults() {
        let gates = ProviderGates::new(4).with_limits(
            "openrouter",
            GateLimits {
                max_in_flight: 8,
                rpm: Some(60),
            },
        );
        assert_eq!(gates.gate("openrouter").limits().max_in_flight, 8);
        assert_eq!(gates.gate("anthropic").limits().max_in_flight, 4);
        assert!(Arc::ptr_eq(&gates.gate("anthropic"), &gates.gate("anthropic")));
    }

    #[test]
    fn test_zero_limit_clamped() {
        let gate = ProviderGate::new(GateLimits {
            max_in_flight: 0,
            rpm: None,
        });
        assert_eq!(gate.limits().max_in_flight, 1);
    }
}
