//! Outbound service client.
//!
//! # Data Flow
//! ```text
//! request(service, path, options)
//!     → breaker gate (fail fast if open, no network attempt)
//!     → per attempt (1..=retry_attempts):
//!         discovery healthy list → selector picks instance
//!         → HTTP call with deadline
//!         → success: record into breaker, return envelope
//!         → failure: record into breaker, linear backoff, next attempt
//!     → last attempt's error surfaces to the caller unchanged
//! ```
//!
//! # Design Decisions
//! - No healthy instance is an ordinary attempt failure, not a separate
//!   fast path: it feeds the same retry and breaker accounting
//! - Non-2xx responses become errors carrying status and body text; 4xx
//!   is retried like 5xx, matching the upstream gateway behavior
//! - The per-call timeout aborts only the in-flight request, never the
//!   retry loop
//! - Sensitive headers are redacted before any log emission

pub mod select;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde_json::Value;

use crate::breaker::BreakerRegistry;
use crate::config::ClientConfig;
use crate::discovery::ServiceDiscovery;
use crate::error::Error;
use crate::observability::metrics;

pub use select::{InstanceSelector, RoundRobin, UniformRandom};

/// Header names whose values never reach the logs.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "api-key",
];

/// Replace sensitive header values before logging.
pub fn redact_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let redacted = if SENSITIVE_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.clone()
            };
            (name.clone(), redacted)
        })
        .collect()
}

/// Per-call options for [`ServiceClient::request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HashMap<String, String>,
    /// JSON payload for body-bearing verbs.
    pub body: Option<Value>,
    /// Overrides the configured request timeout for this call.
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }
}

/// Parsed response envelope.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub data: Value,
    pub status: u16,
    pub headers: HashMap<String, String>,
}

/// One entry of a [`ServiceClient::batch_request`] call.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub service: String,
    pub path: String,
    pub options: RequestOptions,
}

/// Issues protected outbound calls to named services.
pub struct ServiceClient {
    config: ClientConfig,
    discovery: Arc<ServiceDiscovery>,
    breakers: Arc<BreakerRegistry>,
    selector: Box<dyn InstanceSelector>,
    http: reqwest::Client,
}

impl ServiceClient {
    /// Build a client with the default uniform-random selector.
    pub fn new(
        config: ClientConfig,
        discovery: Arc<ServiceDiscovery>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self::with_selector(config, discovery, breakers, Box::new(UniformRandom))
    }

    /// Build a client with an explicit load-balancing policy.
    pub fn with_selector(
        config: ClientConfig,
        discovery: Arc<ServiceDiscovery>,
        breakers: Arc<BreakerRegistry>,
        selector: Box<dyn InstanceSelector>,
    ) -> Self {
        Self {
            config,
            discovery,
            breakers,
            selector,
            http: reqwest::Client::new(),
        }
    }

    /// Issue one protected request.
    ///
    /// The breaker gate is checked once, before any network attempt; an
    /// open breaker fails immediately and is never retried. Every attempt
    /// afterwards records its outcome into the breaker, and attempt `n`
    /// waits `retry_delay * n` before the next one.
    pub async fn request(
        &self,
        service: &str,
        path: &str,
        options: RequestOptions,
    ) -> Result<ServiceResponse, Error> {
        let breaker = self.breakers.get(service);
        if let Err(e) = breaker.try_acquire() {
            metrics::record_request(service, "circuit_open");
            tracing::warn!(service, "Request rejected: circuit breaker open");
            return Err(e);
        }

        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(service, path, &options, attempt).await {
                Ok(response) => {
                    breaker.record_success();
                    metrics::record_request(service, "success");
                    return Ok(response);
                }
                Err(e) => {
                    breaker.record_failure();
                    metrics::record_request(service, outcome_label(&e));
                    tracing::warn!(
                        service,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Request attempt failed"
                    );

                    if attempt >= attempts {
                        return Err(e);
                    }
                    tokio::time::sleep(self.config.retry_delay() * attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        service: &str,
        path: &str,
        options: &RequestOptions,
        attempt: u32,
    ) -> Result<ServiceResponse, Error> {
        let healthy = self.discovery.healthy_instances(service);
        let instance =
            self.selector
                .select(&healthy)
                .ok_or_else(|| Error::NoHealthyInstance {
                    service: service.to_string(),
                })?;

        let url = instance.url().join(path).map_err(|e| Error::InvalidPath {
            path: path.to_string(),
            source: e,
        })?;

        let timeout = options.timeout.unwrap_or_else(|| self.config.request_timeout());

        tracing::debug!(
            service,
            attempt,
            method = %options.method,
            url = %url,
            headers = ?redact_headers(&options.headers),
            "Issuing request"
        );

        let mut request = self
            .http
            .request(options.method.clone(), url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, &self.config.user_agent);

        for (name, value) in &options.headers {
            request = request.header(name, value);
        }

        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    service: service.to_string(),
                    timeout,
                }
            } else {
                Error::Transport {
                    service: service.to_string(),
                    source: e,
                }
            }
        })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let bytes = response.bytes().await.map_err(|e| Error::Transport {
            service: service.to_string(),
            source: e,
        })?;

        if !status.is_success() {
            return Err(Error::Status {
                service: service.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        let data = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| Error::Decode {
                service: service.to_string(),
                source: e,
            })?
        };

        Ok(ServiceResponse {
            data,
            status: status.as_u16(),
            headers,
        })
    }

    pub async fn get(&self, service: &str, path: &str) -> Result<ServiceResponse, Error> {
        self.request(service, path, RequestOptions::default()).await
    }

    pub async fn post(
        &self,
        service: &str,
        path: &str,
        body: Value,
    ) -> Result<ServiceResponse, Error> {
        self.request(
            service,
            path,
            RequestOptions {
                method: Method::POST,
                body: Some(body),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn put(
        &self,
        service: &str,
        path: &str,
        body: Value,
    ) -> Result<ServiceResponse, Error> {
        self.request(
            service,
            path,
            RequestOptions {
                method: Method::PUT,
                body: Some(body),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn patch(
        &self,
        service: &str,
        path: &str,
        body: Value,
    ) -> Result<ServiceResponse, Error> {
        self.request(
            service,
            path,
            RequestOptions {
                method: Method::PATCH,
                body: Some(body),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(&self, service: &str, path: &str) -> Result<ServiceResponse, Error> {
        self.request(
            service,
            path,
            RequestOptions {
                method: Method::DELETE,
                ..Default::default()
            },
        )
        .await
    }

    /// Probe a service through the full protected path, reducing any error
    /// to `false`.
    pub async fn health_check(&self, service: &str) -> bool {
        let path = self.config.health_path.clone();
        self.get(service, &path).await.is_ok()
    }

    /// Issue many requests concurrently, returning one settled result per
    /// input. A failed entry never aborts the others.
    pub async fn batch_request(
        &self,
        requests: Vec<BatchRequest>,
    ) -> Vec<Result<ServiceResponse, Error>> {
        let calls = requests
            .into_iter()
            .map(|r| async move { self.request(&r.service, &r.path, r.options).await });
        join_all(calls).await
    }
}

fn outcome_label(error: &Error) -> &'static str {
    match error {
        Error::CircuitOpen { .. } => "circuit_open",
        Error::NoHealthyInstance { .. } => "no_instance",
        Error::Status { .. } => "status",
        Error::Timeout { .. } => "timeout",
        Error::Transport { .. } => "transport",
        Error::Decode { .. } => "decode",
        Error::InvalidPath { .. } => "invalid_path",
        Error::Handler { .. } => "handler",
    }
}
