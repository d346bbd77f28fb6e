//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! communication core. All types derive Serde traits for deserialization
//! from config files, and every knob carries a production default so a
//! minimal (or empty) config file is valid.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the communication core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CoreConfig {
    /// Circuit breaker thresholds, applied to every lazily created breaker.
    pub breaker: BreakerConfig,

    /// Service discovery and health probing settings.
    pub discovery: DiscoveryConfig,

    /// Outbound service client settings.
    pub client: ClientConfig,

    /// Event bus, retry queue, and history settings.
    pub bus: EventBusConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Initial service registrations (name → instance URLs).
    pub services: Vec<ServiceSeed>,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,

    /// Seconds an open breaker waits before allowing a half-open trial.
    pub reset_timeout_secs: u64,
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 60,
        }
    }
}

/// Service discovery and health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Health probe interval in seconds.
    pub probe_interval_secs: u64,

    /// Per-probe timeout in seconds.
    pub probe_timeout_secs: u64,

    /// Path probed on each instance.
    pub health_path: String,
}

impl DiscoveryConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30,
            probe_timeout_secs: 5,
            health_path: "/health".to_string(),
        }
    }
}

/// Outbound service client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Attempts per call (first try included).
    pub retry_attempts: u32,

    /// Base backoff delay in milliseconds; attempt `n` waits `n * base`.
    pub retry_delay_ms: u64,

    /// Per-request timeout in seconds; aborts the in-flight request.
    pub request_timeout_secs: u64,

    /// Path used by the convenience health check.
    pub health_path: String,

    /// User-Agent header attached to every outbound request.
    pub user_agent: String,
}

impl ClientConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_ms: 1000,
            request_timeout_secs: 10,
            health_path: "/health".to_string(),
            user_agent: "meshlink/0.1".to_string(),
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Redelivery attempts before a queued item is dropped.
    pub max_retries: u32,

    /// Retry queue drain interval in seconds; also the base redelivery
    /// delay (`next_retry = now + retry_delay * attempts`).
    pub retry_delay_secs: u64,

    /// Maximum age of retained history entries in seconds.
    pub history_max_age_secs: u64,

    /// History sweep interval in seconds.
    pub cleanup_interval_secs: u64,
}

impl EventBusConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn history_max_age(&self) -> Duration {
        Duration::from_secs(self.history_max_age_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 5,
            history_max_age_secs: 24 * 60 * 60,
            cleanup_interval_secs: 60 * 60,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Initial registration of one logical service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceSeed {
    /// Logical service name.
    pub name: String,

    /// Instance base URLs (e.g., "http://127.0.0.1:3001").
    pub instances: Vec<String>,

    /// Arbitrary labels, for operator use only.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}
