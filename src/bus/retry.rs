//! Durable retry queue for failed remote deliveries.
//!
//! # Design Decisions
//! - Keyed by `(event_id, subscription_id)`: re-enqueueing a queued pair
//!   is a no-op, so concurrent fan-out failures cannot duplicate work
//! - A claimed item is rescheduled *before* its delivery attempt, so a
//!   crash mid-retry cannot double-count the attempt
//! - Exhausted items are dropped, not retried forever; the drop is the
//!   caller's to log

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use uuid::Uuid;

use crate::bus::event::Event;

/// One pending redelivery.
#[derive(Debug, Clone)]
pub(crate) struct RetryItem {
    pub event: Event,
    pub subscription_id: Uuid,
    pub service: String,
    pub endpoint: String,
    pub attempts: u32,
    /// Unix milliseconds of the earliest next attempt.
    pub next_retry_ms: u64,
}

/// An item removed after exhausting its retries.
#[derive(Debug)]
pub(crate) struct DroppedItem {
    pub event_id: Uuid,
    pub event_type: String,
    pub subscription_id: Uuid,
    pub attempts: u32,
}

/// In-memory retry queue, private to the bus.
#[derive(Debug, Default)]
pub(crate) struct RetryQueue {
    items: Mutex<HashMap<(Uuid, Uuid), RetryItem>>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(Uuid, Uuid), RetryItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a failed delivery. Returns false if the pair was already
    /// queued.
    pub fn enqueue(
        &self,
        event: &Event,
        subscription_id: Uuid,
        service: &str,
        endpoint: &str,
        now_ms: u64,
        initial_delay: Duration,
    ) -> bool {
        let key = (event.id, subscription_id);
        let mut items = self.lock();
        if items.contains_key(&key) {
            return false;
        }
        items.insert(
            key,
            RetryItem {
                event: event.clone(),
                subscription_id,
                service: service.to_string(),
                endpoint: endpoint.to_string(),
                attempts: 0,
                next_retry_ms: now_ms + initial_delay.as_millis() as u64,
            },
        );
        true
    }

    pub fn depth(&self) -> usize {
        self.lock().len()
    }

    pub fn remove(&self, event_id: Uuid, subscription_id: Uuid) {
        self.lock().remove(&(event_id, subscription_id));
    }

    /// Claim every due item for one drain cycle.
    ///
    /// Items past `max_retries` are removed and returned as dropped on the
    /// first cycle that sees them, regardless of their schedule: a queued
    /// item always has attempts left. Claimed items get `attempts`
    /// incremented and `next_retry_ms` rescheduled to
    /// `now + retry_delay * attempts` up front; the caller removes them
    /// only after a successful redelivery.
    pub fn claim_due(
        &self,
        now_ms: u64,
        retry_delay: Duration,
        max_retries: u32,
    ) -> (Vec<RetryItem>, Vec<DroppedItem>) {
        let mut items = self.lock();
        let mut due = Vec::new();
        let mut dropped = Vec::new();

        let exhausted: Vec<(Uuid, Uuid)> = items
            .iter()
            .filter(|(_, item)| item.attempts >= max_retries)
            .map(|(key, _)| *key)
            .collect();
        for key in exhausted {
            if let Some(item) = items.remove(&key) {
                dropped.push(DroppedItem {
                    event_id: item.event.id,
                    event_type: item.event.event_type.clone(),
                    subscription_id: item.subscription_id,
                    attempts: item.attempts,
                });
            }
        }

        for item in items.values_mut() {
            if item.next_retry_ms <= now_ms {
                item.attempts += 1;
                item.next_retry_ms = now_ms + retry_delay.as_millis() as u64 * item.attempts as u64;
                due.push(item.clone());
            }
        }

        (due, dropped)
    }
}
