//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, attempts >= 1)
//! - Check instance URLs parse before they reach discovery
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: CoreConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use url::Url;

use crate::config::schema::CoreConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a deserialized config. Collects every error found.
pub fn validate_config(config: &CoreConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut require_nonzero = |field: &str, value: u64| {
        if value == 0 {
            errors.push(ValidationError {
                field: field.to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
    };

    require_nonzero("breaker.failure_threshold", config.breaker.failure_threshold as u64);
    require_nonzero("breaker.reset_timeout_secs", config.breaker.reset_timeout_secs);
    require_nonzero("discovery.probe_interval_secs", config.discovery.probe_interval_secs);
    require_nonzero("discovery.probe_timeout_secs", config.discovery.probe_timeout_secs);
    require_nonzero("client.retry_attempts", config.client.retry_attempts as u64);
    require_nonzero("client.request_timeout_secs", config.client.request_timeout_secs);
    require_nonzero("bus.retry_delay_secs", config.bus.retry_delay_secs);
    require_nonzero("bus.cleanup_interval_secs", config.bus.cleanup_interval_secs);
    require_nonzero("bus.history_max_age_secs", config.bus.history_max_age_secs);

    if !config.discovery.health_path.starts_with('/') {
        errors.push(ValidationError {
            field: "discovery.health_path".to_string(),
            message: "must start with '/'".to_string(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError {
            field: "observability.metrics_address".to_string(),
            message: format!("not a valid socket address: {}", config.observability.metrics_address),
        });
    }

    for seed in &config.services {
        if seed.name.is_empty() {
            errors.push(ValidationError {
                field: "services.name".to_string(),
                message: "service name must not be empty".to_string(),
            });
        }
        for instance in &seed.instances {
            if Url::parse(instance).is_err() {
                errors.push(ValidationError {
                    field: format!("services.{}.instances", seed.name),
                    message: format!("invalid instance URL: {}", instance),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceSeed;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&CoreConfig::default()).is_ok());
    }

    #[test]
    fn zero_intervals_and_bad_urls_are_collected() {
        let mut config = CoreConfig::default();
        config.client.retry_attempts = 0;
        config.discovery.probe_interval_secs = 0;
        config.services.push(ServiceSeed {
            name: "orders".to_string(),
            instances: vec!["not a url".to_string()],
            labels: Default::default(),
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "client.retry_attempts"));
        assert!(errors.iter().any(|e| e.field == "services.orders.instances"));
    }
}
