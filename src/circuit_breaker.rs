//! Circuit breaker for the payment gateway.
//!
//! Consecutive gateway outages trip the breaker; while it is open, checkout
//! calls fail fast with 503 instead of queueing behind a dead gateway. Once
//! the cool-down has passed, trial calls are let through and enough
//! successes close it again.

use std::{
    future::Future,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{info, warn};

/// Observable breaker position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum Position {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

impl Position {
    fn state(&self) -> CircuitState {
        match self {
            Position::Closed { .. } => CircuitState::Closed,
            Position::Open { .. } => CircuitState::Open,
            Position::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    CircuitOpen,
    #[error("Service call failed: {0}")]
    ServiceFailure(E),
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    cool_down: Duration,
    success_threshold: u32,
    position: Mutex<Position>,
}

impl CircuitBreaker {
    /// Trip after `failure_threshold` consecutive failures, stay open for
    /// `cool_down`, close after `success_threshold` successful trial calls.
    pub fn new(failure_threshold: u32, cool_down: Duration, success_threshold: u32) -> Self {
        Self {
            name: "circuit",
            failure_threshold: failure_threshold.max(1),
            cool_down,
            success_threshold: success_threshold.max(1),
            position: Mutex::new(Position::Closed { failures: 0 }),
        }
    }

    /// Name used in state-change logs
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state()
    }

    /// Run `f`, counting every error as a failure.
    pub async fn call<F, Fut, R, E>(&self, f: F) -> Result<R, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        self.call_counting(|_| true, f).await
    }

    /// Run `f`; only errors for which `is_outage` holds count against the
    /// breaker. Other errors pass through and reset nothing.
    pub async fn call_counting<F, Fut, R, E, P>(
        &self,
        is_outage: P,
        f: F,
    ) -> Result<R, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        P: FnOnce(&E) -> bool,
    {
        if !self.admit() {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                if is_outage(&err) {
                    self.record_failure();
                }
                Err(CircuitBreakerError::ServiceFailure(err))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Position> {
        self.position
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit(&self) -> bool {
        let mut position = self.lock();
        match *position {
            Position::Open { since } if since.elapsed() >= self.cool_down => {
                info!(breaker = self.name, "circuit half-open, allowing trial calls");
                *position = Position::HalfOpen { successes: 0 };
                true
            }
            Position::Open { .. } => false,
            _ => true,
        }
    }

    fn record_success(&self) {
        let mut position = self.lock();
        match &mut *position {
            Position::HalfOpen { successes } => {
                *successes += 1;
                if *successes >= self.success_threshold {
                    info!(breaker = self.name, "circuit closed");
                    *position = Position::Closed { failures: 0 };
                }
            }
            Position::Closed { failures } => *failures = 0,
            // A call admitted before the breaker tripped finished late.
            Position::Open { .. } => {}
        }
    }

    fn record_failure(&self) {
        let mut position = self.lock();
        let trip = match &mut *position {
            Position::Closed { failures } => {
                *failures += 1;
                *failures >= self.failure_threshold
            }
            Position::HalfOpen { .. } => true,
            Position::Open { .. } => false,
        };
        if trip {
            warn!(
                breaker = self.name,
                cool_down_secs = self.cool_down.as_secs(),
                "circuit opened"
            );
            *position = Position::Open {
                since: Instant::now(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn successes_keep_it_closed() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(100), 2);

        let result = breaker.call(|| async { Ok::<_, &str>("intent") }).await;

        assert_matches!(result, Ok("intent"));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn trips_after_consecutive_failures_and_fails_fast() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60), 1).named("gateway");

        let _ = breaker.call(|| async { Err::<(), _>("timeout") }).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        let second = breaker.call(|| async { Err::<(), _>("timeout") }).await;
        assert_matches!(second, Err(CircuitBreakerError::ServiceFailure("timeout")));
        assert_eq!(breaker.state(), CircuitState::Open);

        let mut reached = false;
        let result = breaker
            .call(|| {
                reached = true;
                async { Ok::<_, &str>(()) }
            })
            .await;
        assert_matches!(result, Err(CircuitBreakerError::CircuitOpen));
        assert!(!reached);
    }

    #[tokio::test]
    async fn a_success_resets_the_failure_streak() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60), 1);

        let _ = breaker.call(|| async { Err::<(), _>("blip") }).await;
        let _ = breaker.call(|| async { Ok::<_, &str>(()) }).await;
        let _ = breaker.call(|| async { Err::<(), _>("blip") }).await;

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn non_outage_errors_do_not_count() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60), 1);

        let result = breaker
            .call_counting(|e: &&str| *e == "outage", || async { Err::<(), _>("bad request") })
            .await;

        assert_matches!(result, Err(CircuitBreakerError::ServiceFailure("bad request")));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_closes_after_trial_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10), 1);

        let _ = breaker.call(|| async { Err::<(), _>("down") }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(breaker.call(|| async { Ok::<_, &str>(()) }).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10), 2);

        let _ = breaker.call(|| async { Err::<(), _>("down") }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = breaker.call(|| async { Err::<(), _>("still down") }).await;

        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
