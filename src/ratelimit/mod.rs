//! Token-bucket rate limiter (§4.A).
//!
//! Grounded on the single-slot spacing idiom in the teacher's
//! `scrapers/hashdive_api.rs::RateLimiter`, generalized to a full token
//! bucket with a bounded FIFO waiter queue and a backpressure annotation.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::time::timeout as tokio_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { backpressure: bool },
    Timeout,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_tokens: f64,
    pub refill_rate_per_sec: f64,
    pub min_delay_between_acquires: Duration,
    pub max_queue_size: usize,
    pub backpressure_threshold: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8.0,
            refill_rate_per_sec: 2.0,
            min_delay_between_acquires: Duration::from_millis(50),
            max_queue_size: 200,
            backpressure_threshold: 150,
        }
    }
}

struct Waiter {
    id: u64,
    notify: oneshot::Sender<()>,
}

struct State {
    tokens: f64,
    last_refill: Instant,
    last_fulfilled: Option<Instant>,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
}

/// Process-wide token-bucket admission gate for a single upstream
/// dependency. Construct once and share via `Arc`.
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<State>,
    queue_depth: AtomicUsize,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                tokens: config.max_tokens,
                last_refill: Instant::now(),
                last_fulfilled: None,
                waiters: VecDeque::new(),
                next_waiter_id: 0,
            }),
            queue_depth: AtomicUsize::new(0),
            config,
        })
    }

    fn refill_locked(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.config.refill_rate_per_sec)
            .min(self.config.max_tokens);
        state.last_refill = now;
    }

    fn try_take_locked(&self, state: &mut State) -> bool {
        self.refill_locked(state);
        if state.tokens >= 1.0 {
            if let Some(last) = state.last_fulfilled {
                let since = last.elapsed();
                if since < self.config.min_delay_between_acquires {
                    return false;
                }
            }
            state.tokens -= 1.0;
            state.last_fulfilled = Some(Instant::now());
            true
        } else {
            false
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Attempt to admit one call, waiting up to `timeout_ms` for tokens to
    /// become available. Never panics or propagates an error on overload —
    /// returns `Timeout`/`Rejected` instead (§7, `Backpressure` is
    /// graceful, not fatal).
    pub async fn acquire(&self, timeout_ms: u64) -> AcquireOutcome {
        {
            let mut state = self.state.lock();
            if self.try_take_locked(&mut state) {
                return AcquireOutcome::Acquired { backpressure: false };
            }
        }

        let depth = self.queue_depth.load(Ordering::Relaxed);
        if depth >= self.config.max_queue_size {
            return AcquireOutcome::Rejected;
        }

        let backpressure = depth >= self.config.backpressure_threshold;
        let (tx, rx) = oneshot::channel();
        let my_id;
        {
            let mut state = self.state.lock();
            my_id = state.next_waiter_id;
            state.next_waiter_id += 1;
            state.waiters.push_back(Waiter { id: my_id, notify: tx });
        }
        let depth_after = self.queue_depth.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("rate_limiter_queue_depth").set(depth_after as f64);

        // Poll on a short interval: avoids a second background task per
        // limiter while still draining FIFO as tokens refill. Whichever
        // acquire() call's poll happens to win the token hands it to the
        // front of the queue via `try_take_locked` + `pop_front`, which may
        // not be this call — only return `Acquired` when we were the one
        // actually popped; otherwise the token was awarded to someone else
        // and we keep polling for our own.
        let poll = async {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let mut state = self.state.lock();
                if self.try_take_locked(&mut state) {
                    match state.waiters.pop_front() {
                        Some(w) => {
                            let is_us = w.id == my_id;
                            let _ = w.notify.send(());
                            if is_us {
                                return;
                            }
                            // Awarded to someone else; the token we just
                            // took is spent, so loop and try to take another.
                        }
                        None => return,
                    }
                }
            }
        };

        let outcome = tokio_timeout(Duration::from_millis(timeout_ms), async {
            tokio::select! {
                _ = rx => {}
                _ = poll => {}
            }
        })
        .await;

        let depth_after = self.queue_depth.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::gauge!("rate_limiter_queue_depth").set(depth_after as f64);

        match outcome {
            Ok(_) => AcquireOutcome::Acquired { backpressure },
            Err(_) => AcquireOutcome::Timeout,
        }
    }

    /// Cancel all waiters and refill tokens immediately.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.waiters.clear();
        state.tokens = self.config.max_tokens;
        state.last_refill = Instant::now();
        state.last_fulfilled = None;
        self.queue_depth.store(0, Ordering::Relaxed);
        metrics::gauge!("rate_limiter_queue_depth").set(0.0);
    }
}
