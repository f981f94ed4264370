//! Sliding-window rate limiter with an optional bounded waiter queue.
//!
//! `acquire` admits immediately while the in-window count is below the limit.
//! Overflow either rejects ("Rate limit exceeded") or enqueues up to
//! `max_queue_size` waiters ("Rate limit queue full" beyond that); a
//! background drainer admits waiters as timestamps fall out of the window.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit exceeded")]
    Exceeded,
    #[error("Rate limit queue full")]
    QueueFull,
    #[error("Rate limiter reset")]
    Reset,
}

/// Tuning for one limiter.
#[derive(Clone, Copy, Debug)]
pub struct RateLimiterConfig {
    pub max_requests: usize,
    pub window_ms: u64,
    /// Queue overflow instead of rejecting it.
    pub queue_excess: bool,
    pub max_queue_size: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 1000,
            queue_excess: false,
            max_queue_size: 100,
        }
    }
}

/// Counters exposed by [`RateLimiter::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub allowed: u64,
    pub throttled: u64,
    pub queued: u64,
    pub rejected: u64,
    pub queue_size: usize,
    pub remaining: usize,
}

struct Inner {
    timestamps: VecDeque<Instant>,
    queue: VecDeque<oneshot::Sender<Result<(), RateLimitError>>>,
    allowed: u64,
    throttled: u64,
    queued: u64,
    rejected: u64,
    drainer_running: bool,
}

/// Sliding-window limiter. Cheap to clone via `Arc` internally; share one
/// instance per protected resource.
pub struct RateLimiter {
    config: RateLimiterConfig,
    inner: Arc<Mutex<Inner>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                timestamps: VecDeque::new(),
                queue: VecDeque::new(),
                allowed: 0,
                throttled: 0,
                queued: 0,
                rejected: 0,
                drainer_running: false,
            })),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.config.window_ms)
    }

    /// Acquires one slot, waiting in the queue when configured to.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        let rx = {
            let mut inner = self.inner.lock().expect("limiter lock poisoned");
            prune(&mut inner.timestamps, self.window());
            if inner.timestamps.len() < self.config.max_requests {
                inner.timestamps.push_back(Instant::now());
                inner.allowed += 1;
                return Ok(());
            }
            if !self.config.queue_excess {
                inner.rejected += 1;
                return Err(RateLimitError::Exceeded);
            }
            if inner.queue.len() >= self.config.max_queue_size {
                inner.rejected += 1;
                return Err(RateLimitError::QueueFull);
            }
            let (tx, rx) = oneshot::channel();
            inner.queue.push_back(tx);
            inner.throttled += 1;
            inner.queued += 1;
            if !inner.drainer_running {
                inner.drainer_running = true;
                self.spawn_drainer();
            }
            rx
        };
        rx.await.unwrap_or(Err(RateLimitError::Reset))
    }

    /// Rejects every queued waiter and clears the window.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("limiter lock poisoned");
        inner.timestamps.clear();
        while let Some(tx) = inner.queue.pop_front() {
            let _ = tx.send(Err(RateLimitError::Reset));
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        let mut inner = self.inner.lock().expect("limiter lock poisoned");
        prune(&mut inner.timestamps, self.window());
        RateLimiterStats {
            allowed: inner.allowed,
            throttled: inner.throttled,
            queued: inner.queued,
            rejected: inner.rejected,
            queue_size: inner.queue.len(),
            remaining: self.config.max_requests.saturating_sub(inner.timestamps.len()),
        }
    }

    fn spawn_drainer(&self) {
        let inner = Arc::clone(&self.inner);
        let config = self.config;
        let window = self.window();
        tokio::spawn(async move {
            loop {
                let delay = {
                    let mut guard = inner.lock().expect("limiter lock poisoned");
                    prune(&mut guard.timestamps, window);
                    while guard.timestamps.len() < config.max_requests {
                        match guard.queue.pop_front() {
                            Some(tx) => {
                                guard.timestamps.push_back(Instant::now());
                                guard.allowed += 1;
                                let _ = tx.send(Ok(()));
                            }
                            None => break,
                        }
                    }
                    if guard.queue.is_empty() {
                        guard.drainer_running = false;
                        return;
                    }
                    // Poll again shortly after the oldest slot frees.
                    let next_available = guard
                        .timestamps
                        .front()
                        .map(|oldest| {
                            window.saturating_sub(oldest.elapsed()) + Duration::from_millis(10)
                        })
                        .unwrap_or(Duration::from_millis(10));
                    next_available.min(Duration::from_millis(100))
                };
                tokio::time::sleep(delay).await;
            }
        });
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, window: Duration) {
    let now = Instant::now();
    while let Some(oldest) = timestamps.front() {
        if now.duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: usize, window_ms: u64, queue: bool) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_requests: max,
            window_ms,
            queue_excess: queue,
            max_queue_size: 2,
        })
    }

    #[tokio::test]
    async fn admits_up_to_limit_then_rejects() {
        let limiter = limiter(2, 10_000, false);
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        assert_eq!(limiter.acquire().await, Err(RateLimitError::Exceeded));
        let stats = limiter.stats();
        assert_eq!(stats.allowed, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.remaining, 0);
    }

    #[tokio::test]
    async fn window_frees_slots() {
        let limiter = limiter(1, 50, false);
        limiter.acquire().await.unwrap();
        assert!(limiter.acquire().await.is_err());
        tokio::time::sleep(Duration::from_millis(70)).await;
        limiter.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn queued_waiters_drain_in_order() {
        let limiter = Arc::new(limiter(1, 40, true));
        limiter.acquire().await.unwrap();

        let first = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(limiter.stats().queue_size, 1);

        first.await.unwrap().unwrap();
        assert_eq!(limiter.stats().queue_size, 0);
    }

    #[tokio::test]
    async fn queue_overflow_rejects() {
        let limiter = Arc::new(limiter(1, 5_000, true));
        limiter.acquire().await.unwrap();
        let mut handles = Vec::new();
        for _ in 0..2 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(limiter.acquire().await, Err(RateLimitError::QueueFull));
        limiter.reset();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err(RateLimitError::Reset));
        }
    }

    #[tokio::test]
    async fn reset_rejects_queued_waiters() {
        let limiter = Arc::new(limiter(1, 60_000, true));
        limiter.acquire().await.unwrap();
        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        limiter.reset();
        assert_eq!(waiter.await.unwrap(), Err(RateLimitError::Reset));
    }

    #[tokio::test]
    async fn window_invariant_holds() {
        let limiter = limiter(3, 100, false);
        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }
        let stats = limiter.stats();
        assert!(stats.remaining <= 3);
        assert_eq!(stats.remaining, 0);
    }
}
