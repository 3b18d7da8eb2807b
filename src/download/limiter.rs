//! Token-bucket admission gate shared by all workers.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Float slack when comparing refilled tokens against one permit.
const TOKEN_EPSILON: f64 = 1e-9;

const MIN_WAIT: Duration = Duration::from_millis(1);

/// Internal state of the token bucket.
#[derive(Debug)]
struct TokenBucket {
    /// Maximum tokens held, the burst allowance.
    capacity: f64,
    tokens: f64,
    /// Tokens added per second. Zero disables limiting.
    rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    fn has_token(&self) -> bool {
        self.tokens >= 1.0 - TOKEN_EPSILON
    }

    /// Time until one token is available.
    fn wait_for_token(&self) -> Duration {
        Duration::from_secs_f64(((1.0 - self.tokens) / self.rate).max(0.0)).max(MIN_WAIT)
    }
}

/// Rate limiter for fetch starts.
///
/// Waiters queue on a fair mutex and the holder sleeps while holding it, so
/// permits are granted in arrival order and no waiter starves. Refill uses
/// the monotonic clock.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    unlimited: bool,
    acquire_timeout: Duration,
}

impl RateLimiter {
    /// Create a limiter admitting `requests_per_second` with bursts of `burst_size`.
    ///
    /// The bucket starts full.
    pub fn new(requests_per_second: f64, burst_size: u32, acquire_timeout: Duration) -> Self {
        let capacity = f64::from(burst_size.max(1));
        let rate = if requests_per_second.is_finite() {
            requests_per_second.max(0.0)
        } else {
            0.0
        };
        Self {
            bucket: Mutex::new(TokenBucket {
                capacity,
                tokens: capacity,
                rate,
                last_refill: Instant::now(),
            }),
            unlimited: rate == 0.0,
            acquire_timeout,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.unlimited
    }

    /// Wait for a permit, failing with [`Error::RateLimitTimeout`] after the
    /// configured deadline.
    pub async fn acquire(&self, worker_id: usize) -> Result<()> {
        self.acquire_within(worker_id, self.acquire_timeout).await
    }

    pub async fn acquire_within(&self, worker_id: usize, deadline: Duration) -> Result<()> {
        match tokio::time::timeout(deadline, self.take(worker_id)).await {
            Ok(()) => Ok(()),
            Err(_) => {
                tracing::debug!(worker_id, ?deadline, "Rate limiter deadline elapsed");
                Err(Error::RateLimitTimeout(deadline))
            }
        }
    }

    async fn take(&self, worker_id: usize) {
        if self.unlimited {
            return;
        }

        let mut bucket = self.bucket.lock().await;

        loop {
            bucket.refill(Instant::now());
            if bucket.has_token() {
                bucket.tokens = (bucket.tokens - 1.0).max(0.0);
                tracing::trace!(worker_id, tokens_left = bucket.tokens, "Rate limit acquired");
                return;
            }

            let wait = bucket.wait_for_token();
            tracing::debug!(worker_id, wait_ms = wait.as_millis() as u64, "Rate limit hit, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait() {
        let limiter = RateLimiter::new(2.0, 5, Duration::from_secs(30));
        let start = Instant::now();

        for worker in 0..5 {
            limiter.acquire(worker).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire(5).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped_at_burst() {
        let limiter = RateLimiter::new(10.0, 2, Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(60)).await;

        let start = Instant::now();
        limiter.acquire(0).await.unwrap();
        limiter.acquire(0).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.acquire(0).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let limiter = RateLimiter::new(0.1, 1, Duration::from_secs(1));
        limiter.acquire(0).await.unwrap();

        let err = limiter.acquire(1).await.unwrap_err();
        assert!(matches!(err, Error::RateLimitTimeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_is_unlimited() {
        let limiter = RateLimiter::new(0.0, 1, Duration::from_millis(1));
        assert!(limiter.is_unlimited());
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire(0).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_waiter_is_served() {
        let limiter = Arc::new(RateLimiter::new(5.0, 1, Duration::from_secs(60)));
        let start = Instant::now();

        let handles: Vec<_> = (0..10)
            .map(|worker| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire(worker).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // One burst token, then nine refills at 5/s.
        assert!(start.elapsed() >= Duration::from_millis(1800));
    }
}
