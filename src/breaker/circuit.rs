//! Per-service circuit breaker state machine.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::BreakerConfig;
use crate::error::Error;
use crate::observability::metrics;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Read-only snapshot of a breaker, for the observability surface.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub service: String,
    pub state: BreakerState,
    pub failure_count: u32,
    /// Milliseconds since the most recent recorded failure, if any.
    pub last_failure_ms_ago: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Failure tracker and call gate for one downstream service.
///
/// Counters are mutated only through [`record_success`](Self::record_success),
/// [`record_failure`](Self::record_failure), and the gate check in
/// [`try_acquire`](Self::try_acquire). The lock is never held across an await.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: &BreakerConfig) -> Self {
        Self {
            service: service.into(),
            failure_threshold: config.failure_threshold,
            reset_timeout: config.reset_timeout(),
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State is plain data; a panicked holder cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check the gate before an outbound call.
    ///
    /// Closed passes. Open passes only once the reset timeout has elapsed
    /// since the last failure, flipping to Half-Open; that flip admits
    /// exactly one trial call, so a breaker already in Half-Open rejects
    /// until the trial reports back.
    pub fn try_acquire(&self) -> Result<(), Error> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => Err(Error::CircuitOpen {
                service: self.service.clone(),
            }),
            BreakerState::Open => {
                let elapsed = inner.last_failure.map(|t| t.elapsed());
                match elapsed {
                    Some(elapsed) if elapsed > self.reset_timeout => {
                        inner.state = BreakerState::HalfOpen;
                        tracing::info!(
                            service = %self.service,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Circuit breaker half-open, allowing trial call"
                        );
                        metrics::record_breaker_transition(&self.service, "half_open");
                        Ok(())
                    }
                    _ => Err(Error::CircuitOpen {
                        service: self.service.clone(),
                    }),
                }
            }
        }
    }

    /// Record a successful call. Always closes the breaker and zeroes the
    /// failure count, regardless of prior state.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!(service = %self.service, "Circuit breaker closed");
            metrics::record_breaker_transition(&self.service, "closed");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    /// Record a failed call, opening the breaker once the threshold is hit.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        if inner.failure_count >= self.failure_threshold && inner.state != BreakerState::Open {
            inner.state = BreakerState::Open;
            tracing::warn!(
                service = %self.service,
                failure_count = inner.failure_count,
                threshold = self.failure_threshold,
                "Circuit breaker opened"
            );
            metrics::record_breaker_transition(&self.service, "open");
        }
    }

    /// Gate, run, and record one asynchronous operation.
    ///
    /// The operation's own error is re-thrown after being recorded as a
    /// failure; a rejected gate returns [`Error::CircuitOpen`] without
    /// invoking the operation.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.try_acquire()?;
        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    /// Force the breaker back to Closed with no recorded failures.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        tracing::debug!(service = %self.service, "Circuit breaker reset");
    }

    /// Read-only snapshot. Never mutates state.
    pub fn status(&self) -> BreakerStatus {
        let inner = self.lock();
        BreakerStatus {
            service: self.service.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_ms_ago: inner.last_failure.map(|t| t.elapsed().as_millis() as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        let config = BreakerConfig {
            failure_threshold: threshold,
            reset_timeout_secs: 60,
        };
        let mut b = CircuitBreaker::new("orders", &config);
        b.reset_timeout = Duration::from_millis(reset_ms);
        b
    }

    #[test]
    fn opens_after_threshold_failures() {
        let b = breaker(3, 50);
        for _ in 0..2 {
            b.record_failure();
            assert!(b.try_acquire().is_ok());
        }
        b.record_failure();
        assert_eq!(b.status().state, BreakerState::Open);
        assert!(b.try_acquire().is_err());
    }

    #[test]
    fn success_closes_and_zeroes_count() {
        let b = breaker(3, 50);
        b.record_failure();
        b.record_failure();
        b.record_success();
        let status = b.status();
        assert_eq!(status.state, BreakerState::Closed);
        assert_eq!(status.failure_count, 0);
    }

    #[tokio::test]
    async fn half_open_admits_exactly_one_trial() {
        let b = breaker(1, 20);
        b.record_failure();
        assert!(b.try_acquire().is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;

        // First caller gets the trial slot, second is rejected.
        assert!(b.try_acquire().is_ok());
        assert_eq!(b.status().state, BreakerState::HalfOpen);
        assert!(b.try_acquire().is_err());

        b.record_success();
        assert_eq!(b.status().state, BreakerState::Closed);
        assert!(b.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let b = breaker(1, 20);
        b.record_failure();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(b.try_acquire().is_ok());
        b.record_failure();
        assert_eq!(b.status().state, BreakerState::Open);
        assert!(b.try_acquire().is_err());
    }

    #[tokio::test]
    async fn execute_rejects_without_invoking_when_open() {
        let b = breaker(1, 10_000);
        b.record_failure();

        let invoked = std::sync::atomic::AtomicBool::new(false);
        let result = b
            .execute(|| async {
                invoked.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<(), Error>(())
            })
            .await;

        assert!(matches!(result, Err(Error::CircuitOpen { .. })));
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn execute_records_and_rethrows_operation_error() {
        let b = breaker(5, 50);
        let result: Result<(), Error> = b
            .execute(|| async {
                Err(Error::NoHealthyInstance {
                    service: "orders".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(Error::NoHealthyInstance { .. })));
        assert_eq!(b.status().failure_count, 1);
    }
}
