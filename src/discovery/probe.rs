//! Active health probing.
//!
//! # Responsibilities
//! - Periodically probe every registered instance of every service
//! - Update instance health state and last-check time
//!
//! # Design Decisions
//! - Any response at all counts as healthy; only transport errors and
//!   timeouts mark an instance down (status-code strictness is left to
//!   the service client's own accounting)

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time;

use crate::config::DiscoveryConfig;
use crate::discovery::ServiceDiscovery;
use crate::observability::metrics;

pub struct HealthProber {
    discovery: Arc<ServiceDiscovery>,
    config: DiscoveryConfig,
    client: reqwest::Client,
}

impl HealthProber {
    pub fn new(discovery: Arc<ServiceDiscovery>, config: DiscoveryConfig) -> Self {
        Self {
            discovery,
            config,
            client: reqwest::Client::new(),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.config.probe_interval_secs,
            path = %self.config.health_path,
            "Health prober starting"
        );

        let mut ticker = time::interval(self.config.probe_interval());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn check_all(&self) {
        for (service, instances) in self.discovery.all_instances() {
            for instance in instances {
                let target = match instance.url().join(&self.config.health_path) {
                    Ok(url) => url,
                    Err(e) => {
                        tracing::error!(
                            service = %service,
                            url = %instance.url(),
                            error = %e,
                            "Failed to build health probe URL"
                        );
                        continue;
                    }
                };

                let response = time::timeout(
                    self.config.probe_timeout(),
                    self.client.get(target.clone()).send(),
                )
                .await;

                let healthy = match response {
                    Ok(Ok(resp)) => {
                        if !resp.status().is_success() {
                            tracing::debug!(
                                service = %service,
                                url = %target,
                                status = %resp.status(),
                                "Health probe got non-success status, treating as alive"
                            );
                        }
                        true
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(
                            service = %service,
                            url = %target,
                            error = %e,
                            "Health probe failed: connection error"
                        );
                        false
                    }
                    Err(_) => {
                        tracing::warn!(
                            service = %service,
                            url = %target,
                            "Health probe failed: timeout"
                        );
                        false
                    }
                };

                instance.mark(healthy);
                metrics::record_instance_health(&service, instance.url().as_str(), healthy);
            }
        }
    }
}
