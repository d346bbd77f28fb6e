//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! register_service(name, urls)
//!     → instance table (name → [ServiceInstance], all healthy initially)
//!
//! probe.rs (periodic task):
//!     → GET health path on every instance
//!     → mark healthy/unhealthy + last check time
//!
//! healthy_instances(name)
//!     → currently healthy subset (empty for unknown names, never an error)
//! ```
//!
//! # Design Decisions
//! - Health is advisory and eventually consistent: a probe cycle may lag a
//!   real outage by up to one interval, so the service client retries and
//!   reports into the breaker independently of the probe cycle
//! - Probe failure marks an instance unhealthy but never removes it; a
//!   removed instance could not recover
//! - The probe task is owned here and cancellable; starting twice is a no-op

pub mod probe;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;
use url::Url;

use crate::config::DiscoveryConfig;
use crate::lifecycle::{Shutdown, TaskSlot};

use probe::HealthProber;

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One network instance of a logical service.
///
/// Health state uses atomics so probe updates need no table-wide lock,
/// mirroring per-request reads from the client path.
#[derive(Debug)]
pub struct ServiceInstance {
    url: Url,
    healthy: AtomicBool,
    /// Unix millis of the last probe; 0 = never probed.
    last_check_ms: AtomicU64,
}

impl ServiceInstance {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            healthy: AtomicBool::new(true),
            last_check_ms: AtomicU64::new(0),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Unix millis of the last probe, if one has run.
    pub fn last_check_ms(&self) -> Option<u64> {
        match self.last_check_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Record a probe outcome. Only the probe task calls this.
    pub(crate) fn mark(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
        self.last_check_ms.store(unix_millis(), Ordering::Relaxed);
    }
}

/// Per-instance entry in the observability summary.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    pub url: String,
    pub healthy: bool,
    pub last_check_ms: Option<u64>,
}

/// The instance registry plus its owned health probe task.
pub struct ServiceDiscovery {
    config: DiscoveryConfig,
    services: DashMap<String, Vec<Arc<ServiceInstance>>>,
    probe_task: TaskSlot,
    probe_shutdown: Shutdown,
}

impl ServiceDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            services: DashMap::new(),
            probe_task: TaskSlot::named("health-probe"),
            probe_shutdown: Shutdown::new(),
        }
    }

    /// Replace the instance list for a service. Every instance starts
    /// healthy with no last-check time.
    pub fn register_service(&self, name: &str, urls: Vec<Url>) {
        let instances: Vec<Arc<ServiceInstance>> = urls
            .into_iter()
            .map(|url| Arc::new(ServiceInstance::new(url)))
            .collect();
        tracing::info!(
            service = name,
            instance_count = instances.len(),
            "Service registered"
        );
        self.services.insert(name.to_string(), instances);
    }

    /// Currently healthy instances. Empty (not an error) for unknown names.
    pub fn healthy_instances(&self, name: &str) -> Vec<Arc<ServiceInstance>> {
        self.services
            .get(name)
            .map(|instances| {
                instances
                    .iter()
                    .filter(|i| i.is_healthy())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Per-service instance/health summary for operators.
    pub fn summary(&self) -> HashMap<String, Vec<InstanceSummary>> {
        self.services
            .iter()
            .map(|entry| {
                let summaries = entry
                    .value()
                    .iter()
                    .map(|i| InstanceSummary {
                        url: i.url().to_string(),
                        healthy: i.is_healthy(),
                        last_check_ms: i.last_check_ms(),
                    })
                    .collect();
                (entry.key().clone(), summaries)
            })
            .collect()
    }

    /// Snapshot of every registered instance, for the probe cycle.
    pub(crate) fn all_instances(&self) -> Vec<(String, Vec<Arc<ServiceInstance>>)> {
        self.services
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Start the periodic health probe task. A second call while the task
    /// is running is a no-op.
    pub fn start_health_checks(self: &Arc<Self>) {
        let prober = HealthProber::new(self.clone(), self.config.clone());
        self.probe_task
            .spawn(&self.probe_shutdown, |shutdown| prober.run(shutdown));
    }

    /// Stop the probe task. An in-progress cycle runs to completion.
    pub fn stop_health_checks(&self) {
        self.probe_shutdown.stop(&[&self.probe_task]);
    }
}
