//! Asynchronous event bus.
//!
//! # Data Flow
//! ```text
//! publish(type, data, options)
//!     → append to history
//!     → local subscribers: invoked synchronously, registration order
//!     → remote subscribers: concurrent HTTP POST fan-out (spawned,
//!       fire-and-forget relative to the publisher)
//!         → failure: enqueue (event_id, subscription_id) in retry.rs
//!
//! retry drain task (every retry_delay):
//!     → due items redelivered sequentially, bounded by max_retries
//!     → exhausted items dropped with a warning
//!
//! history sweep task (every cleanup_interval):
//!     → evict events older than history_max_age
//! ```
//!
//! # Design Decisions
//! - Local delivery is synchronous and ordered (cheap inside one process);
//!   remote delivery is at-least-once with bounded retries (network
//!   partition is possible). The split is a deliberate consistency
//!   tradeoff, not an accident
//! - One subscriber's failure never blocks another's delivery and never
//!   reaches the publisher
//! - History and the retry queue are private; external access is read-only
//!   through `event_history` and `stats`

pub mod event;
mod retry;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Method;
use serde_json::Value;
use tokio::time;
use uuid::Uuid;

use crate::client::{RequestOptions, ServiceClient};
use crate::config::EventBusConfig;
use crate::error::Error;
use crate::lifecycle::{Shutdown, TaskSlot};
use crate::observability::metrics;

use event::unix_millis;
use retry::RetryQueue;

pub use event::{BusStats, Event, EventFilter, EventHandler, PublishOptions, Subscription, SubscriptionTarget};

/// In-process publish/subscribe hub with remote fan-out.
pub struct EventBus {
    config: EventBusConfig,
    client: Arc<ServiceClient>,
    /// eventType → subscriptions in registration order.
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    history: Mutex<Vec<Event>>,
    retry_queue: RetryQueue,
    retry_task: TaskSlot,
    sweep_task: TaskSlot,
    shutdown: Shutdown,
}

impl EventBus {
    pub fn new(config: EventBusConfig, client: Arc<ServiceClient>) -> Self {
        Self {
            config,
            client,
            subscriptions: RwLock::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            retry_queue: RetryQueue::new(),
            retry_task: TaskSlot::named("retry-worker"),
            sweep_task: TaskSlot::named("history-sweeper"),
            shutdown: Shutdown::new(),
        }
    }

    /// Publish an event. Returns the event id.
    ///
    /// Local subscribers run synchronously, in registration order, before
    /// this returns. Remote subscribers are notified from a spawned task;
    /// their failures are queued for retry and never surface here.
    pub fn publish(self: &Arc<Self>, event_type: &str, data: Value, options: PublishOptions) -> Uuid {
        let id = Uuid::new_v4();
        let event = Event {
            id,
            event_type: event_type.to_string(),
            data,
            timestamp: unix_millis(),
            source: options.source.unwrap_or_else(|| "unknown".to_string()),
            correlation_id: options.correlation_id.unwrap_or_else(|| id.to_string()),
            metadata: options.metadata,
        };

        tracing::debug!(
            event_id = %id,
            event_type,
            correlation_id = %event.correlation_id,
            "Event published"
        );
        metrics::record_event_published(event_type);

        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());

        let (locals, remotes) = self.matching_subscribers(event_type);

        for (subscription_id, handler) in locals {
            if let Err(e) = handler(&event) {
                tracing::warn!(
                    event_id = %id,
                    subscription_id = %subscription_id,
                    error = %e,
                    "Local handler failed"
                );
            }
        }

        if !remotes.is_empty() {
            let bus = self.clone();
            tokio::spawn(async move {
                bus.fan_out(event, remotes).await;
            });
        }

        id
    }

    /// Split the matching subscriptions into local handlers and remote
    /// targets, preserving registration order for the locals.
    #[allow(clippy::type_complexity)]
    fn matching_subscribers(
        &self,
        event_type: &str,
    ) -> (Vec<(Uuid, EventHandler)>, Vec<(Uuid, String, String)>) {
        let subscriptions = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut locals = Vec::new();
        let mut remotes = Vec::new();
        if let Some(subs) = subscriptions.get(event_type) {
            for sub in subs {
                match &sub.target {
                    SubscriptionTarget::Local(handler) => locals.push((sub.id, handler.clone())),
                    SubscriptionTarget::Remote { service, endpoint } => {
                        remotes.push((sub.id, service.clone(), endpoint.clone()))
                    }
                }
            }
        }
        (locals, remotes)
    }

    /// Deliver to every remote subscriber concurrently; failed deliveries
    /// enter the retry queue.
    async fn fan_out(self: Arc<Self>, event: Event, remotes: Vec<(Uuid, String, String)>) {
        let deliveries = remotes.into_iter().map(|(subscription_id, service, endpoint)| {
            let event = event.clone();
            let bus = self.clone();
            async move {
                if let Err(e) =
                    deliver_remote(&bus.client, &event, subscription_id, &service, &endpoint).await
                {
                    tracing::warn!(
                        event_id = %event.id,
                        subscription_id = %subscription_id,
                        service = %service,
                        error = %e,
                        "Remote delivery failed, queueing for retry"
                    );
                    bus.retry_queue.enqueue(
                        &event,
                        subscription_id,
                        &service,
                        &endpoint,
                        unix_millis(),
                        bus.config.retry_delay(),
                    );
                    metrics::record_retry_queue_depth(bus.retry_queue.depth());
                }
            }
        });
        join_all(deliveries).await;
    }

    /// Register a local subscriber, invoked synchronously on publish.
    pub fn subscribe_local(&self, event_type: &str, handler: EventHandler) -> Uuid {
        self.add_subscription(event_type, SubscriptionTarget::Local(handler))
    }

    /// Register a remote subscriber, notified by HTTP POST through the
    /// service client.
    pub fn subscribe_remote(&self, event_type: &str, service: &str, endpoint: &str) -> Uuid {
        self.add_subscription(
            event_type,
            SubscriptionTarget::Remote {
                service: service.to_string(),
                endpoint: endpoint.to_string(),
            },
        )
    }

    fn add_subscription(&self, event_type: &str, target: SubscriptionTarget) -> Uuid {
        let subscription = Subscription {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            target,
            created_at: unix_millis(),
        };
        let id = subscription.id;
        tracing::debug!(
            subscription_id = %id,
            event_type,
            local = subscription.is_local(),
            "Subscription added"
        );
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.to_string())
            .or_default()
            .push(subscription);
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, subscription_id: Uuid) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for subs in subscriptions.values_mut() {
            if let Some(pos) = subs.iter().position(|s| s.id == subscription_id) {
                let removed = subs.remove(pos);
                tracing::debug!(
                    subscription_id = %subscription_id,
                    event_type = %removed.event_type,
                    "Subscription removed"
                );
                return true;
            }
        }
        false
    }

    /// Query history, newest first, optionally capped by `filter.limit`.
    pub fn event_history(&self, filter: &EventFilter) -> Vec<Event> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let mut results = Vec::new();
        for event in history.iter().rev() {
            if filter.matches(event) {
                results.push(event.clone());
                if let Some(limit) = filter.limit {
                    if results.len() >= limit {
                        break;
                    }
                }
            }
        }
        results
    }

    /// Observability snapshot.
    pub fn stats(&self) -> BusStats {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let mut events_by_type: HashMap<String, usize> = HashMap::new();
        let mut events_by_source: HashMap<String, usize> = HashMap::new();
        for event in history.iter() {
            *events_by_type.entry(event.event_type.clone()).or_default() += 1;
            *events_by_source.entry(event.source.clone()).or_default() += 1;
        }
        let total_events = history.len();
        drop(history);

        let total_subscriptions = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum();

        BusStats {
            total_events,
            total_subscriptions,
            retry_queue_depth: self.retry_queue.depth(),
            events_by_type,
            events_by_source,
        }
    }

    /// Evict history entries older than `max_age`. Returns the eviction
    /// count.
    pub fn cleanup_history(&self, max_age: Duration) -> usize {
        let cutoff = unix_millis().saturating_sub(max_age.as_millis() as u64);
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let before = history.len();
        history.retain(|e| e.timestamp >= cutoff);
        let removed = before - history.len();
        if removed > 0 {
            tracing::info!(removed, retained = history.len(), "Event history pruned");
        }
        removed
    }

    /// Start the retry drain and history sweep tasks. Starting either
    /// while it is already running is a no-op.
    pub fn start_background_tasks(self: &Arc<Self>) {
        self.start_retry_worker();
        self.start_history_sweeper();
    }

    fn start_retry_worker(self: &Arc<Self>) {
        let bus = self.clone();
        self.retry_task
            .spawn(&self.shutdown, |mut shutdown| async move {
                tracing::info!(
                    interval_secs = bus.config.retry_delay_secs,
                    max_retries = bus.config.max_retries,
                    "Retry worker starting"
                );
                let mut ticker = time::interval(bus.config.retry_delay());
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            bus.drain_retry_queue().await;
                        }
                        _ = shutdown.recv() => {
                            tracing::info!("Retry worker received shutdown signal, exiting loop");
                            break;
                        }
                    }
                }
            });
    }

    fn start_history_sweeper(self: &Arc<Self>) {
        let bus = self.clone();
        self.sweep_task
            .spawn(&self.shutdown, |mut shutdown| async move {
                let mut ticker = time::interval(bus.config.cleanup_interval());
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            bus.cleanup_history(bus.config.history_max_age());
                        }
                        _ = shutdown.recv() => {
                            tracing::info!("History sweeper received shutdown signal, exiting loop");
                            break;
                        }
                    }
                }
            });
    }

    /// Stop both background tasks. In-progress cycles run to completion.
    pub fn stop_background_tasks(&self) {
        self.shutdown.stop(&[&self.retry_task, &self.sweep_task]);
    }

    /// One drain cycle: drop exhausted items, redeliver due items.
    /// Redeliveries within one cycle run sequentially, so a given
    /// `(event, subscription)` pair never has two attempts in flight.
    pub(crate) async fn drain_retry_queue(&self) {
        let (due, dropped) = self.retry_queue.claim_due(
            unix_millis(),
            self.config.retry_delay(),
            self.config.max_retries,
        );

        for item in dropped {
            tracing::warn!(
                event_id = %item.event_id,
                event_type = %item.event_type,
                subscription_id = %item.subscription_id,
                attempts = item.attempts,
                "Dropping delivery after exhausting retries"
            );
            metrics::record_retry_dropped(&item.event_type);
        }

        for item in due {
            match deliver_remote(
                &self.client,
                &item.event,
                item.subscription_id,
                &item.service,
                &item.endpoint,
            )
            .await
            {
                Ok(()) => {
                    tracing::info!(
                        event_id = %item.event.id,
                        subscription_id = %item.subscription_id,
                        attempt = item.attempts,
                        "Redelivery succeeded"
                    );
                    self.retry_queue.remove(item.event.id, item.subscription_id);
                }
                Err(e) => {
                    tracing::warn!(
                        event_id = %item.event.id,
                        subscription_id = %item.subscription_id,
                        attempt = item.attempts,
                        error = %e,
                        "Redelivery failed"
                    );
                }
            }
        }

        metrics::record_retry_queue_depth(self.retry_queue.depth());
    }
}

/// POST one event to one remote subscriber, carrying the gateway's wire
/// contract: `{event, subscription}` body plus correlation headers.
async fn deliver_remote(
    client: &ServiceClient,
    event: &Event,
    subscription_id: Uuid,
    service: &str,
    endpoint: &str,
) -> Result<(), Error> {
    let mut headers = HashMap::new();
    headers.insert("X-Event-Type".to_string(), event.event_type.clone());
    headers.insert("X-Event-Id".to_string(), event.id.to_string());
    headers.insert("X-Correlation-Id".to_string(), event.correlation_id.clone());

    let body = serde_json::json!({
        "event": event,
        "subscription": {
            "id": subscription_id,
            "eventType": event.event_type,
        },
    });

    client
        .request(
            service,
            endpoint,
            RequestOptions {
                method: Method::POST,
                headers,
                body: Some(body),
                timeout: None,
            },
        )
        .await
        .map(|_| ())
}
