// src/exec/retry.rs

//! Exponential backoff between attempts.

use std::time::Duration;

const BACKOFF_MULTIPLIER: f64 = 2.0;

/// How many times to retry a failed attempt and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Total attempts allowed, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt may follow the (1-based) `attempt` that just
    /// failed. Never true for `u32::MAX`, so the attempt counter cannot wrap.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * BACKOFF_MULTIPLIER.powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_retry() {
        let p = RetryPolicy::new(5, Duration::from_millis(250), Duration::from_secs(60));
        assert_eq!(p.delay_for(0), Duration::from_millis(250));
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(3), Duration::from_secs(2));
    }

    #[test]
    fn delay_is_capped() {
        let p = RetryPolicy::new(50, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(p.delay_for(4), Duration::from_secs(10));
        assert_eq!(p.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn zero_base_delay_never_waits() {
        let p = RetryPolicy::new(3, Duration::ZERO, Duration::from_secs(10));
        assert_eq!(p.delay_for(2), Duration::ZERO);
        assert_eq!(p.delay_for(u32::MAX), Duration::ZERO);
    }

    #[test]
    fn retry_budget() {
        let p = RetryPolicy::new(2, Duration::ZERO, Duration::ZERO);
        assert_eq!(p.max_attempts(), 3);
        assert!(p.should_retry(1));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
    }

    #[test]
    fn unbounded_retry_budget_stops_before_the_counter_overflows() {
        let p = RetryPolicy::new(u32::MAX, Duration::ZERO, Duration::ZERO);
        assert_eq!(p.max_attempts(), u32::MAX);
        assert!(p.should_retry(u32::MAX - 1));
        assert!(!p.should_retry(u32::MAX));
    }
}
