//! Backoff schedule between delivery attempts.
//!
//! The documented schedule is `min(base * 2^(attempt - 1), cap)`: with the
//! defaults that is 1s, 2s, 4s, 8s, 16s and never more than 60s. Jitter is
//! off by default and, when enabled, is bounded to ±20% and re-capped.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, Result};

/// Largest accepted jitter factor (±20%).
pub const MAX_JITTER_FACTOR: f64 = 0.2;

/// Retry budget and delay schedule for one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Ceiling applied to every delay.
    pub max_delay: Duration,

    /// Random spread applied to each delay, 0.0 to [`MAX_JITTER_FACTOR`].
    pub jitter_factor: f64,

    /// How the delay grows from one attempt to the next.
    pub strategy: BackoffStrategy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(60_000),
            jitter_factor: 0.0,
            strategy: BackoffStrategy::Exponential,
        }
    }
}

/// Growth of the delay across attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay every time.
    Fixed,
    /// Delay doubles after each attempt.
    Exponential,
    /// Delay grows by `base_delay` after each attempt.
    Linear,
}

impl BackoffPolicy {
    /// Exponential policy with the given budget and default delays.
    pub fn exponential(max_attempts: u32) -> Self {
        Self { max_attempts, ..Self::default() }
    }

    /// Checks the policy for values that would make dispatch meaningless.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` for a zero attempt budget,
    /// a zero base delay, a base delay above the cap, or a jitter factor
    /// outside `0.0..=0.2`.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(DeliveryError::configuration("max_attempts must be greater than 0"));
        }
        if self.base_delay.is_zero() {
            return Err(DeliveryError::configuration("base_delay must be greater than 0"));
        }
        if self.base_delay > self.max_delay {
            return Err(DeliveryError::configuration(format!(
                "base_delay ({}ms) cannot exceed max_delay ({}ms)",
                self.base_delay.as_millis(),
                self.max_delay.as_millis()
            )));
        }
        if !(0.0..=MAX_JITTER_FACTOR).contains(&self.jitter_factor) {
            return Err(DeliveryError::configuration(format!(
                "jitter_factor must be between 0.0 and {MAX_JITTER_FACTOR}"
            )));
        }
        Ok(())
    }

    /// Deterministic delay to wait after failed attempt `attempt` (1-based).
    ///
    /// Non-decreasing in `attempt` and never above `max_delay`. Attempt 0 is
    /// treated as attempt 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);

        let uncapped = match self.strategy {
            BackoffStrategy::Fixed => Some(self.base_delay),
            BackoffStrategy::Linear => self.base_delay.checked_mul(attempt),
            BackoffStrategy::Exponential => {
                let exponent = (attempt - 1).min(31);
                self.base_delay.checked_mul(1_u32 << exponent)
            },
        };

        uncapped.map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay actually slept after failed attempt `attempt`: [`Self::delay`]
    /// with jitter applied, still capped at `max_delay`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        apply_jitter(self.delay(attempt), self.jitter_factor).min(self.max_delay)
    }

    /// Un-jittered delays between consecutive attempts of a fully failing
    /// dispatch: `max_attempts - 1` entries, since nothing is slept after the
    /// final attempt.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|attempt| self.delay(attempt)).collect()
    }

    /// Sum of [`Self::schedule`].
    pub fn total_backoff(&self) -> Duration {
        self.schedule().iter().sum()
    }
}

/// Spreads `duration` uniformly over `±jitter_factor`.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let spread = duration.as_secs_f64() * jitter_factor.clamp(0.0, MAX_JITTER_FACTOR);
    let offset = rand::rng().random_range(-spread..=spread);

    Duration::try_from_secs_f64((duration.as_secs_f64() + offset).max(0.0)).unwrap_or(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_from_one_second() {
        let policy = BackoffPolicy::default();

        let delays: Vec<u128> = (1..=7).map(|attempt| policy.delay(attempt).as_millis()).collect();

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 60_000]);
        assert_eq!(policy.delay(40), Duration::from_secs(60));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn attempt_zero_is_first_attempt() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), policy.delay(1));
    }

    #[test]
    fn schedule_excludes_delay_after_final_attempt() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.schedule(), vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
        ]);
        assert_eq!(policy.total_backoff(), Duration::from_millis(15_000));
        assert!(BackoffPolicy::exponential(1).schedule().is_empty());
    }

    #[test]
    fn fixed_and_linear_strategies() {
        let fixed = BackoffPolicy {
            strategy: BackoffStrategy::Fixed,
            base_delay: Duration::from_secs(3),
            ..Default::default()
        };
        assert!((1..=5).all(|attempt| fixed.delay(attempt) == Duration::from_secs(3)));

        let linear = BackoffPolicy {
            strategy: BackoffStrategy::Linear,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(12),
            ..Default::default()
        };
        assert_eq!(linear.delay(1), Duration::from_secs(5));
        assert_eq!(linear.delay(2), Duration::from_secs(10));
        assert_eq!(linear.delay(3), Duration::from_secs(12));
    }

    #[test]
    fn huge_base_delay_saturates_at_cap() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_secs(u64::MAX / 4),
            max_delay: Duration::from_secs(u64::MAX / 2),
            ..Default::default()
        };

        assert_eq!(policy.delay(10), policy.max_delay);
    }

    #[test]
    fn jitter_stays_within_twenty_percent_and_cap() {
        let policy = BackoffPolicy { jitter_factor: MAX_JITTER_FACTOR, ..Default::default() };
        let mut seen = std::collections::HashSet::new();

        for _ in 0..50 {
            let delay = policy.next_delay(3).as_millis();
            assert!((3_200..=4_800).contains(&delay), "delay out of range: {delay}ms");
            seen.insert(delay);

            assert!(policy.next_delay(30) <= policy.max_delay);
        }

        assert!(seen.len() > 1, "jitter should vary the delay");
    }

    #[test]
    fn no_jitter_means_next_delay_is_deterministic() {
        let policy = BackoffPolicy::default();
        assert!((1..=10).all(|attempt| policy.next_delay(attempt) == policy.delay(attempt)));
    }

    #[test]
    fn validation_rejects_unusable_policies() {
        assert!(BackoffPolicy::default().validate().is_ok());
        assert!(BackoffPolicy::exponential(0).validate().is_err());
        assert!(BackoffPolicy { base_delay: Duration::ZERO, ..Default::default() }
            .validate()
            .is_err());
        assert!(BackoffPolicy {
            base_delay: Duration::from_secs(120),
            max_delay: Duration::from_secs(60),
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(BackoffPolicy { jitter_factor: 0.5, ..Default::default() }.validate().is_err());
        assert!(BackoffPolicy { jitter_factor: -0.1, ..Default::default() }.validate().is_err());
    }
}
