//! Circuit breaker (§4.B).
//!
//! `CLOSED -> OPEN -> HALF_OPEN -> CLOSED` state machine guarding each
//! upstream dependency. Grounded on the mutex-guarded counters struct shape
//! used throughout the teacher (`signals/detector.rs`, `middleware/rate_limit.rs`)
//! and the registry-behind-mutex idiom from the pack's strategy registries.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn gauge_value(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitOpenError {
    pub name: String,
    pub next_retry: DateTime<Utc>,
}

impl fmt::Display for CircuitOpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "circuit '{}' is open, next retry at {}",
            self.name, self.next_retry
        )
    }
}

impl std::error::Error for CircuitOpenError {}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CircuitStats {
    pub state: Option<CircuitState>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub total_trips: u64,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    next_retry: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    total_trips: u64,
}

/// A single named breaker. Kept per upstream dependency (market data,
/// sentiment, database) as a process-wide singleton.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                next_retry: None,
                last_success: None,
                last_failure: None,
                total_trips: 0,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn report_state(&self, state: CircuitState) {
        metrics::gauge!("circuit_breaker_state", "dependency" => self.name.clone())
            .set(state.gauge_value());
    }

    /// Check-or-transition: call before issuing the upstream request.
    /// Returns `Err` immediately without any I/O if the circuit is open.
    fn pre_call(&self) -> Result<(), CircuitOpenError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let now = Utc::now();
                let retry_at = inner.next_retry.unwrap_or(now);
                if now >= retry_at {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    drop(inner);
                    self.report_state(CircuitState::HalfOpen);
                    Ok(())
                } else {
                    Err(CircuitOpenError {
                        name: self.name.clone(),
                        next_retry: retry_at,
                    })
                }
            }
            CircuitState::HalfOpen => Ok(()),
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.last_success = Some(Utc::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.next_retry = None;
                    drop(inner);
                    self.report_state(CircuitState::Closed);
                    return;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(Utc::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.next_retry = Some(Utc::now() + self.config.reset_timeout);
                    inner.total_trips += 1;
                    drop(inner);
                    self.report_state(CircuitState::Open);
                    return;
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.next_retry = Some(Utc::now() + self.config.reset_timeout);
                inner.consecutive_successes = 0;
                inner.total_trips += 1;
                drop(inner);
                self.report_state(CircuitState::Open);
                return;
            }
            CircuitState::Open => {}
        }
    }

    /// Wrap an awaitable call. `E` must be convertible from
    /// `CircuitOpenError` so callers can match on a single error type.
    pub async fn execute<T, E, F, Fut>(&self, fn_: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        self.pre_call().map_err(E::from)?;
        match fn_().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    pub fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock();
        CircuitStats {
            state: Some(inner.state),
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            last_success: inner.last_success,
            last_failure: inner.last_failure,
            total_trips: inner.total_trips,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

/// Process-wide registry of named breakers, one per upstream dependency.
#[derive(Default)]
pub struct CircuitRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| CircuitBreaker::new(name, config))
            .clone()
    }

    pub fn all_stats(&self) -> HashMap<String, CircuitStats> {
        self.breakers
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.stats()))
            .collect()
    }
}
