//! Circuit breaker guarding outbound model calls.
//!
//! Closed counts consecutive failures; at the threshold the circuit opens
//! and rejects calls until the recovery timeout elapses, after which one
//! half-open probe decides whether to close again.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use oc_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Gate a call. `Err(CircuitOpen)` while the circuit is open and the
    /// recovery timeout has not elapsed; otherwise the caller proceeds and
    /// must report the outcome via [`record_success`] / [`record_failure`].
    ///
    /// [`record_success`]: CircuitBreaker::record_success
    /// [`record_failure`]: CircuitBreaker::record_failure
    pub fn acquire(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    tracing::debug!("circuit breaker half-open, allowing probe");
                    Ok(())
                } else {
                    Err(Error::CircuitOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            // A failed half-open probe re-opens immediately.
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            _ => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
        }
    }
}
