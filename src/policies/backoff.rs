//! # Retry backoff for failing handlers.
//!
//! [`BackoffPolicy`] controls how long the error-recovery middleware waits
//! between handler attempts. The delay for retry `n` (0-indexed) is
//! `first × factor^n`, clamped to `max`, then jitter is applied.
//!
//! The bus default is `first = 1s`, `factor = 2`, `max = 5s`, giving
//! `1s, 2s, 4s, 5s, 5s, ...`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use relaybus::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy::default();
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(1));
//! assert_eq!(backoff.next(1), Duration::from_secs(2));
//! assert_eq!(backoff.next(2), Duration::from_secs(4));
//! // 8s → capped at max=5s
//! assert_eq!(backoff.next(3), Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap for retries.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter policy to spread retries of many subscribers.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns the delivery retry schedule:
    /// - `first = 1s`;
    /// - `factor = 2.0`;
    /// - `max = 5s`;
    /// - no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before retry number `retry` (0-indexed).
    ///
    /// The base delay is `first × factor^retry`, clamped to [`BackoffPolicy::max`].
    /// Jitter is applied to the clamped base and never fed back into later retries.
    pub fn next(&self, retry: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = retry.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_matches_delivery_retries() {
        let policy = BackoffPolicy::default();
        let delays: Vec<_> = (0..5).map(|n| policy.next(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn constant_factor() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::None,
        };
        for retry in 0..10 {
            assert_eq!(policy.next(retry), Duration::from_millis(500));
        }
    }

    #[test]
    fn first_exceeding_max_is_clamped() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn overflow_clamps_to_max() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn equal_jitter_stays_within_half_and_base() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Equal,
            ..BackoffPolicy::default()
        };
        for retry in 0..8 {
            let base = BackoffPolicy::default().next(retry);
            let delay = policy.next(retry);
            assert!(delay >= base / 2, "retry {retry}: {delay:?} < half of {base:?}");
            assert!(delay <= base, "retry {retry}: {delay:?} > {base:?}");
        }
    }

    #[test]
    fn decorrelated_jitter_never_below_first() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Decorrelated,
            ..BackoffPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.next(3);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(5));
        }
    }
}
