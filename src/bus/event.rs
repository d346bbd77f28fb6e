//! Event, subscription, and query types for the bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;

/// Current time as unix milliseconds.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A published event. Immutable once published; retained in history
/// until pruned by age.
///
/// The wire format keeps the gateway's JSON field names, so remote
/// subscribers written against the original contract keep working.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    /// Unix milliseconds at publish time.
    pub timestamp: u64,
    pub source: String,
    /// Correlates causally related events; defaults to the event id.
    pub correlation_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Optional fields for [`EventBus::publish`](crate::bus::EventBus::publish).
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub source: Option<String>,
    pub correlation_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Synchronous handler invoked for local subscriptions.
///
/// A returned error is logged and isolated; it never reaches the
/// publisher or other subscribers.
pub type EventHandler = Arc<dyn Fn(&Event) -> Result<(), Error> + Send + Sync>;

/// Where a subscription delivers: in-process handler or remote endpoint.
/// The enum makes local-XOR-remote structural.
#[derive(Clone)]
pub enum SubscriptionTarget {
    Local(EventHandler),
    Remote { service: String, endpoint: String },
}

impl std::fmt::Debug for SubscriptionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionTarget::Local(_) => f.write_str("Local(..)"),
            SubscriptionTarget::Remote { service, endpoint } => f
                .debug_struct("Remote")
                .field("service", service)
                .field("endpoint", endpoint)
                .finish(),
        }
    }
}

/// One registered subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub event_type: String,
    pub target: SubscriptionTarget,
    /// Unix milliseconds at registration time.
    pub created_at: u64,
}

impl Subscription {
    pub fn is_local(&self) -> bool {
        matches!(self.target, SubscriptionTarget::Local(_))
    }
}

/// Filters for history queries. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub source: Option<String>,
    pub correlation_id: Option<String>,
    /// Inclusive lower bound, unix milliseconds.
    pub since: Option<u64>,
    /// Inclusive upper bound, unix milliseconds.
    pub until: Option<u64>,
    /// Cap on the number of (newest-first) results.
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(t) = &self.event_type {
            if &event.event_type != t {
                return false;
            }
        }
        if let Some(s) = &self.source {
            if &event.source != s {
                return false;
            }
        }
        if let Some(c) = &self.correlation_id {
            if &event.correlation_id != c {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Bus observability snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    pub total_events: usize,
    pub total_subscriptions: usize,
    pub retry_queue_depth: usize,
    pub events_by_type: HashMap<String, usize>,
    pub events_by_source: HashMap<String, usize>,
}
