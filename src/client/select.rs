//! Instance selection strategies.
//!
//! The selector receives the already-filtered healthy list; it only picks,
//! it never judges health. Uniform random is the default policy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::discovery::ServiceInstance;

/// Pluggable load-balancing policy for the service client.
pub trait InstanceSelector: Send + Sync + std::fmt::Debug {
    /// Pick one instance from the healthy list, or None if it is empty.
    fn select(&self, instances: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>>;
}

/// Uniform random selection.
#[derive(Debug, Default)]
pub struct UniformRandom;

impl InstanceSelector for UniformRandom {
    fn select(&self, instances: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..instances.len());
        Some(instances[index].clone())
    }
}

/// Round-robin selection.
/// Stores an internal counter to rotate through instances.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InstanceSelector for RoundRobin {
    fn select(&self, instances: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        if instances.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % instances.len();
        Some(instances[index].clone())
    }
}
