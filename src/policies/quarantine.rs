//! # Quarantine policy for repeatedly failing subscribers.
//!
//! Once a subscriber has accumulated [`QuarantinePolicy::threshold`] exhausted
//! deliveries, it is suspended for `base × 2^min(failures - threshold, max_exponent)`.
//! With the defaults that is 1 minute on the fifth failure, doubling up to 64 minutes.
//!
//! ```rust
//! use std::time::Duration;
//! use relaybus::QuarantinePolicy;
//!
//! let q = QuarantinePolicy::default();
//! assert_eq!(q.suspension(4), None);
//! assert_eq!(q.suspension(5), Some(Duration::from_secs(60)));
//! assert_eq!(q.suspension(6), Some(Duration::from_secs(120)));
//! assert_eq!(q.suspension(50), Some(Duration::from_secs(60 * 64)));
//! ```

use std::time::Duration;

/// Circuit-breaker knobs applied by the error-recovery middleware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuarantinePolicy {
    /// Cumulative failure count that trips the quarantine (`0` disables it).
    pub threshold: u32,
    /// Suspension for the first trip.
    pub base: Duration,
    /// Cap on the doubling exponent.
    pub max_exponent: u32,
}

impl Default for QuarantinePolicy {
    /// `threshold = 5`, `base = 60s`, `max_exponent = 6`.
    fn default() -> Self {
        Self {
            threshold: 5,
            base: Duration::from_secs(60),
            max_exponent: 6,
        }
    }
}

impl QuarantinePolicy {
    /// Returns the suspension for a subscriber with `failures` cumulative failures,
    /// or `None` if it stays below the threshold.
    pub fn suspension(&self, failures: u32) -> Option<Duration> {
        if self.threshold == 0 || failures < self.threshold {
            return None;
        }
        let exp = (failures - self.threshold).min(self.max_exponent).min(31);
        Some(self.base.saturating_mul(1u32 << exp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_threshold_disables() {
        let q = QuarantinePolicy {
            threshold: 0,
            ..QuarantinePolicy::default()
        };
        assert_eq!(q.suspension(100), None);
    }

    #[test]
    fn doubles_until_cap() {
        let q = QuarantinePolicy::default();
        let mins: Vec<u64> = (5..=12)
            .map(|f| q.suspension(f).map(|d| d.as_secs() / 60).unwrap_or(0))
            .collect();
        assert_eq!(mins, vec![1, 2, 4, 8, 16, 32, 64, 64]);
    }
}
