//! # Diagnostics emitted by the bus internals.
//!
//! [`DiagnosticKind`] classifies what happened; [`Diagnostic`] carries the
//! optional metadata (subscriber, event type, context, reason, counters).
//!
//! Each diagnostic has a process-wide monotonic `seq`, so observers can restore
//! the exact order when queues deliver them out of order.
//!
//! ```rust
//! use std::time::Duration;
//! use relaybus::{Diagnostic, DiagnosticKind};
//!
//! let d = Diagnostic::new(DiagnosticKind::SubscriberQuarantined)
//!     .with_subscriber("sub-1")
//!     .with_event("ping")
//!     .with_count(5)
//!     .with_delay(Duration::from_secs(60));
//!
//! assert_eq!(d.delay_ms, Some(60_000));
//! assert_eq!(d.event.as_deref(), Some("ping"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

static DIAGNOSTIC_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of bus diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    // === Subscriber lifecycle ===
    /// A subscriber was registered. Sets `subscriber`, `event`.
    SubscriberAdded,
    /// A subscriber was removed (unsubscribe, sweep or destroy). Sets `subscriber`, `event`, `reason`.
    SubscriberRemoved,

    // === Delivery ===
    /// A handler attempt failed and will be retried. Sets `subscriber`, `event`, `attempt`, `delay_ms`, `reason`.
    RetryScheduled,
    /// A delivery failed after all retries. Sets `subscriber`, `event`, `count` (failure count), `reason`.
    DeliveryFailed,
    /// A subscriber was quarantined. Sets `subscriber`, `event`, `count`, `delay_ms`.
    SubscriberQuarantined,
    /// A quarantine expired and the subscriber resumed. Sets `subscriber`, `event`.
    QuarantineCleared,
    /// A transformation function failed and was skipped. Sets `subscriber`, `event`, `reason`.
    TransformFailed,
    /// Serializing a payload failed; delivery continued unserialized. Sets `event`, `reason`.
    SerializationFailed,
    /// An event type was repeatedly slow. Sets `event`, `context`, `count`, `delay_ms` (threshold).
    SlowEvents,
    /// The loop guard blocked an event storm. Sets `event`, `count`.
    StormBlocked,

    // === Routing ===
    /// Local interest announced to other contexts. Sets `event`, `context` (channel).
    InterestAnnounced,
    /// A local emission was forwarded. Sets `event`, `context` (channel), `count` (targets).
    EventForwarded,
    /// A channel failed and the next one will be tried. Sets `event`, `context` (channel), `reason`.
    ChannelFailed,
    /// Every channel failed; the message was dropped. Sets `event`, `reason`.
    MessageDropped,

    // === Observers ===
    /// An observer panicked. Sets `subscriber` (observer name), `reason`.
    ObserverPanicked,
    /// An observer dropped a diagnostic (queue full or closed). Sets `subscriber`, `reason`.
    ObserverOverflow,
}

/// Bus diagnostic with optional metadata.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Classification.
    pub kind: DiagnosticKind,

    /// Subscriber (or observer) id.
    pub subscriber: Option<Arc<str>>,
    /// Application event type.
    pub event: Option<Arc<str>>,
    /// Context id or channel name, depending on the kind.
    pub context: Option<Arc<str>>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Attempt number (1-based).
    pub attempt: Option<u32>,
    /// Delay or duration in milliseconds.
    pub delay_ms: Option<u64>,
    /// Kind-specific counter.
    pub count: Option<u64>,
}

impl Diagnostic {
    /// Creates a diagnostic of the given kind with current timestamp and next sequence number.
    pub fn new(kind: DiagnosticKind) -> Self {
        Self {
            seq: DIAGNOSTIC_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            subscriber: None,
            event: None,
            context: None,
            reason: None,
            attempt: None,
            delay_ms: None,
            count: None,
        }
    }

    /// Attaches a subscriber id.
    #[inline]
    pub fn with_subscriber(mut self, id: impl Into<Arc<str>>) -> Self {
        self.subscriber = Some(id.into());
        self
    }

    /// Attaches an event type.
    #[inline]
    pub fn with_event(mut self, event: impl Into<Arc<str>>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Attaches a context id or channel name.
    #[inline]
    pub fn with_context(mut self, context: impl Into<Arc<str>>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Attaches a counter.
    #[inline]
    pub fn with_count(mut self, n: u64) -> Self {
        self.count = Some(n);
        self
    }

    /// Creates an observer overflow diagnostic.
    #[inline]
    pub fn observer_overflow(observer: &'static str, reason: &'static str) -> Self {
        Diagnostic::new(DiagnosticKind::ObserverOverflow)
            .with_subscriber(observer)
            .with_reason(format!("observer={observer} reason={reason}"))
    }

    /// Creates an observer panic diagnostic.
    #[inline]
    pub fn observer_panicked(observer: &'static str, info: String) -> Self {
        Diagnostic::new(DiagnosticKind::ObserverPanicked)
            .with_subscriber(observer)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Diagnostic::new(DiagnosticKind::SubscriberAdded);
        let b = Diagnostic::new(DiagnosticKind::SubscriberAdded);
        assert!(b.seq > a.seq);
    }
}
