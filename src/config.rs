//! # Per-context bus configuration.
//!
//! Provides [`BusConfig`], the centralized settings of one bus context.
//! The config is consumed by [`BusNode::builder`](crate::BusNode::builder), which
//! hands the relevant sections to each default middleware.
//!
//! ## Sentinel values
//! - `inactive_after = 0s` → subscribers are never swept for inactivity
//! - `quarantine.threshold = 0` → quarantine disabled
//! - `slow_event_warn_after = 0` → no slow-event warning

use std::time::Duration;

use crate::policies::{BackoffPolicy, QuarantinePolicy};

/// Configuration of one bus context.
///
/// ## Field semantics
/// - `duplicate_window`: identical (event, payload) pairs inside it are dropped
/// - `storm_threshold` / `storm_window`: more fires than the threshold inside the window block the event type
/// - `sweep_interval`: how often expired loop-guard and rate-limit entries (and idle subscribers) are swept
/// - `default_max_retries`: handler retries for subscribers that don't override it
/// - `retry`: delay schedule between handler attempts
/// - `quarantine`: suspension of repeatedly failing subscribers
/// - `validator_timeout`: hard deadline for async category validators
/// - `batch_delay`: default coalescing window for batching rules
/// - `slow_event` / `slow_event_warn_after`: metrics slow-event detection
/// - `diagnostics_capacity`: ring buffer size of the diagnostics bus (min 1)
/// - `codec_max_depth`: deepest payload nesting the codec accepts
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Window in which an identical (event, payload) pair counts as a duplicate.
    pub duplicate_window: Duration,
    /// Maximum fires of one event type inside [`BusConfig::storm_window`].
    pub storm_threshold: u32,
    /// Rolling window for storm detection.
    pub storm_window: Duration,
    /// Sweep period for loop-guard bookkeeping and inactive subscribers.
    pub sweep_interval: Duration,
    /// Subscribers idle for longer than this are removed (`0s` = never).
    pub inactive_after: Duration,

    /// Handler retries when a subscriber does not override it.
    pub default_max_retries: u32,
    /// Backoff between handler attempts.
    pub retry: BackoffPolicy,
    /// Quarantine of repeatedly failing subscribers.
    pub quarantine: QuarantinePolicy,

    /// Deadline for async category validators.
    pub validator_timeout: Duration,
    /// Default coalescing window for batching rules.
    pub batch_delay: Duration,

    /// A delivery slower than this counts as slow.
    pub slow_event: Duration,
    /// Number of slow deliveries of one event before a warning (`0` = never).
    pub slow_event_warn_after: u32,

    /// Capacity of the diagnostics broadcast channel.
    pub diagnostics_capacity: usize,
    /// Deepest payload nesting accepted by the codec.
    pub codec_max_depth: usize,
}

impl BusConfig {
    /// Returns the inactivity limit as an `Option`.
    ///
    /// - `None` → never sweep idle subscribers
    /// - `Some(d)` → remove subscribers idle for longer than `d`
    #[inline]
    pub fn inactivity_limit(&self) -> Option<Duration> {
        if self.inactive_after == Duration::ZERO {
            None
        } else {
            Some(self.inactive_after)
        }
    }

    /// Returns a diagnostics capacity clamped to a minimum of 1.
    #[inline]
    pub fn diagnostics_capacity_clamped(&self) -> usize {
        self.diagnostics_capacity.max(1)
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - duplicates within `100ms`, storms above `3` fires per `1s`
    /// - sweep every `30s`, no inactivity sweep
    /// - `3` retries, backoff `1s → 5s`, quarantine from `5` failures for `60s × 2^n`
    /// - validators time out after `1s`
    /// - batching window `150ms`
    /// - slow events above `100ms`, warn after `5`
    fn default() -> Self {
        Self {
            duplicate_window: Duration::from_millis(100),
            storm_threshold: 3,
            storm_window: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(30),
            inactive_after: Duration::ZERO,
            default_max_retries: 3,
            retry: BackoffPolicy::default(),
            quarantine: QuarantinePolicy::default(),
            validator_timeout: Duration::from_secs(1),
            batch_delay: Duration::from_millis(150),
            slow_event: Duration::from_millis(100),
            slow_event_warn_after: 5,
            diagnostics_capacity: 1024,
            codec_max_depth: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sentinels() {
        let mut cfg = BusConfig::default();
        assert_eq!(cfg.inactivity_limit(), None);
        cfg.inactive_after = Duration::from_secs(600);
        assert_eq!(cfg.inactivity_limit(), Some(Duration::from_secs(600)));

        cfg.diagnostics_capacity = 0;
        assert_eq!(cfg.diagnostics_capacity_clamped(), 1);
    }
}
