//! Retry policy with exponential backoff.
//!
//! Transient fetch failures are retried by the worker that holds the task,
//! waiting `delay_for(attempt)` between attempts. Jitter spreads the delay
//! uniformly over `[delay, 2 * delay]`.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::Error;

/// Bounded retry policy for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Whether a task that has failed `attempts` times may be retried after `error`.
    pub fn should_retry(&self, error: &Error, attempts: u32) -> bool {
        error.is_retryable() && attempts <= self.max_retries
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Delay before retry number `attempt`, honoring a server hint if larger.
    pub fn delay_for(&self, attempt: u32, error: &Error) -> Duration {
        let base = self.base_delay(attempt);
        let delay = if self.jitter { add_jitter(base) } else { base };
        match error.retry_after() {
            Some(hint) if hint > delay => hint,
            _ => delay,
        }
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = policy();
        assert_eq!(policy.base_delay(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay(3), Duration::from_millis(350));
        assert_eq!(policy.base_delay(30), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_within_double() {
        let policy = RetryPolicy {
            jitter: true,
            ..policy()
        };
        let err = Error::Network("reset".into());
        for _ in 0..50 {
            let delay = policy.delay_for(1, &err);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_retry_after_hint_wins_when_longer() {
        let policy = policy();
        let quota = Error::QuotaExceeded {
            retry_after: Some(5),
        };
        assert_eq!(policy.delay_for(1, &quota), Duration::from_secs(5));
    }

    #[test]
    fn test_should_retry_bounds() {
        let policy = policy();
        let transient = Error::Network("reset".into());
        let permanent = Error::NotFound("gone".into());

        assert!(policy.should_retry(&transient, 1));
        assert!(policy.should_retry(&transient, 3));
        assert!(!policy.should_retry(&transient, 4));
        assert!(!policy.should_retry(&permanent, 1));
        assert!(!RetryPolicy::none().should_retry(&transient, 1));
    }
}
