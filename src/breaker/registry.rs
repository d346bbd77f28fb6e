//! Breaker ownership: one circuit breaker per service name.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::breaker::circuit::{BreakerStatus, CircuitBreaker};
use crate::config::BreakerConfig;

/// Owns the breaker table. Pure bookkeeping: lookups never fail and
/// creation is lazy, so a service name always resolves to the same
/// breaker instance for the life of the registry.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Get or lazily create the breaker for a service name.
    pub fn get(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                tracing::debug!(service, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(service, &self.config))
            })
            .clone()
    }

    /// Status snapshots for every owned breaker.
    pub fn all_status(&self) -> HashMap<String, BreakerStatus> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }

    /// Reset every owned breaker to closed.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
        tracing::info!(count = self.breakers.len(), "All circuit breakers reset");
    }
}
