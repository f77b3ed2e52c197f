//! # Retry Scheduler
//!
//! A purely functional backoff policy over `{initial_delay, multiplier,
//! max_delay, max_attempts}`. No I/O, no shared state — every method takes
//! an attempt count and returns a value.
//!
//! ## Backoff Curve
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              Delay(attempt) = min(initial × multiplier^(attempt-1), max)│
//! │                                                                         │
//! │  attempt:    1        2        3        4        5                     │
//! │  default:    1s       2s       4s       8s      15s (capped)           │
//! │  aggressive: 500ms    750ms   1.125s   1.69s   2.53s                   │
//! │  fast:       100ms    200ms   400ms(capped to 2s ceiling if needed)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use rand::Rng;

// =============================================================================
// Retry Policy
// =============================================================================

/// Stateless exponential-backoff-with-jitter policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const fn new(initial_delay: Duration, multiplier: f64, max_delay: Duration, max_attempts: u32) -> Self {
        RetryPolicy { initial_delay, multiplier, max_delay, max_attempts }
    }

    /// `Delay(attempt)` = `min(initialDelay × multiplier^(attempt−1), maxDelay)`
    /// for `attempt >= 1`; `0` for `attempt <= 0`.
    pub fn delay(&self, attempt: i64) -> Duration {
        if attempt <= 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// `DelayWithJitter(attempt, jitterFraction)` =
    /// `max(0, Delay(attempt) + U(-jitter, +jitter))` where
    /// `jitter = Delay(attempt) * jitterFraction`. Default `jitterFraction = 0.1`.
    pub fn delay_with_jitter(&self, attempt: i64, jitter_fraction: f64) -> Duration {
        let base = self.delay(attempt).as_secs_f64();
        let jitter = base * jitter_fraction;
        let offset = rand::thread_rng().gen_range(-jitter..=jitter);
        Duration::from_secs_f64((base + offset).max(0.0))
    }

    /// Convenience wrapper for [`Self::delay_with_jitter`] with a default
    /// jitter fraction of `0.1`.
    pub fn delay_with_default_jitter(&self, attempt: i64) -> Duration {
        self.delay_with_jitter(attempt, 0.1)
    }

    /// `ShouldRetry(attempt)` = `attempt < maxAttempts`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// `MaxTotalWait()` = Σ `Delay(k)` for `k` in `1..maxAttempts-1`.
    pub fn max_total_wait(&self) -> Duration {
        if self.max_attempts < 2 {
            return Duration::ZERO;
        }
        (1..self.max_attempts).map(|k| self.delay(k as i64)).sum()
    }
}

// =============================================================================
// Predefined Profiles
// =============================================================================

impl RetryPolicy {
    /// `initial=1000ms, multiplier=2.0, max=15s, maxAttempts=3`.
    pub const DEFAULT: RetryPolicy = RetryPolicy::new(Duration::from_millis(1_000), 2.0, Duration::from_secs(15), 3);

    /// `initial=1000ms, multiplier=2.0, max=30s, maxAttempts=5`.
    pub const CONSERVATIVE: RetryPolicy =
        RetryPolicy::new(Duration::from_millis(1_000), 2.0, Duration::from_secs(30), 5);

    /// `initial=500ms, multiplier=1.5, max=10s, maxAttempts=3`.
    pub const AGGRESSIVE: RetryPolicy =
        RetryPolicy::new(Duration::from_millis(500), 1.5, Duration::from_secs(10), 3);

    /// `initial=100ms, multiplier=2.0, max=2s, maxAttempts=2`.
    pub const FAST: RetryPolicy = RetryPolicy::new(Duration::from_millis(100), 2.0, Duration::from_secs(2), 2);
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::DEFAULT
    }
}

impl From<&crate::config::EngineConfig> for RetryPolicy {
    fn from(config: &crate::config::EngineConfig) -> Self {
        RetryPolicy::new(
            Duration::from_millis(config.initial_retry_delay_ms),
            config.backoff_multiplier,
            Duration::from_millis(config.max_retry_delay_ms),
            config.max_attempts,
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_zero_for_non_positive_attempts() {
        assert_eq!(RetryPolicy::DEFAULT.delay(0), Duration::ZERO);
        assert_eq!(RetryPolicy::DEFAULT.delay(-1), Duration::ZERO);
    }

    #[test]
    fn delay_follows_exponential_curve() {
        let policy = RetryPolicy::new(Duration::from_millis(1_000), 2.0, Duration::from_secs(15), 5);
        assert_eq!(policy.delay(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay(3), Duration::from_millis(4_000));
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let policy = RetryPolicy::new(Duration::from_millis(1_000), 2.0, Duration::from_secs(15), 10);
        // 2^(10-1) * 1000ms would be enormous; must cap at 15s.
        assert_eq!(policy.delay(10), Duration::from_secs(15));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::DEFAULT;
        let base = policy.delay(2).as_secs_f64();
        for _ in 0..50 {
            let jittered = policy.delay_with_jitter(2, 0.1).as_secs_f64();
            assert!(jittered >= (base * 0.9) - f64::EPSILON);
            assert!(jittered <= (base * 1.1) + f64::EPSILON);
        }
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 2.0, Duration::from_secs(1), 3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn max_total_wait_sums_delays_up_to_max_attempts_minus_one() {
        let policy = RetryPolicy::new(Duration::from_millis(1_000), 2.0, Duration::from_secs(15), 3);
        // k in 1..3 => delay(1) + delay(2) = 1000ms + 2000ms
        assert_eq!(policy.max_total_wait(), Duration::from_millis(3_000));
    }

    #[test]
    fn predefined_profiles_have_expected_tunables() {
        assert_eq!(RetryPolicy::DEFAULT.max_attempts, 3);
        assert_eq!(RetryPolicy::CONSERVATIVE.max_attempts, 5);
        assert_eq!(RetryPolicy::AGGRESSIVE.initial_delay, Duration::from_millis(500));
        assert_eq!(RetryPolicy::FAST.max_delay, Duration::from_secs(2));
    }

    #[test]
    fn all_profiles_respect_backoff_bound() {
        for profile in [RetryPolicy::DEFAULT, RetryPolicy::CONSERVATIVE, RetryPolicy::AGGRESSIVE, RetryPolicy::FAST] {
            for attempt in 1..20 {
                assert!(profile.delay(attempt) <= profile.max_delay);
            }
        }
    }
}
