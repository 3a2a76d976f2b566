//! # Subscriber preferences.
//!
//! [`SubscriberOptions`] bundles how a subscriber wants its deliveries handled:
//! priority among siblings, retries and fallback, rate limiting, event filter
//! patterns, payload transformations and cross-context participation.
//!
//! ```rust
//! use std::time::Duration;
//! use relaybus::{FallbackBehavior, SubscriberOptions};
//!
//! let opts = SubscriberOptions::new()
//!     .priority(5)
//!     .max_retries(0)
//!     .fallback(FallbackBehavior::Ignore)
//!     .debounce(Duration::from_millis(50))
//!     .pattern("user:");
//! assert_eq!(opts.priority, 5);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::bus::context::EmitContext;
use crate::error::BusError;
use crate::policies::FallbackBehavior;
use crate::value::Value;

/// Payload transformation.
///
/// Returns the new payload and may rewrite the context bag in place. On `Err`
/// the step is logged and both payload and context edits are discarded.
pub type Transformation = Arc<dyn Fn(&Value, &mut EmitContext) -> Result<Value, String> + Send + Sync>;

/// Event filter pattern.
#[derive(Clone, Debug)]
pub enum EventPattern {
    /// `*` matches everything; otherwise an exact or substring match.
    Text(String),
    /// Regular expression.
    Regex(Regex),
}

impl EventPattern {
    /// True if the pattern accepts `event`.
    pub fn matches(&self, event: &str) -> bool {
        match self {
            EventPattern::Text(t) => t == "*" || event == t || event.contains(t.as_str()),
            EventPattern::Regex(re) => re.is_match(event),
        }
    }
}

/// Per-subscriber preferences.
#[derive(Clone, Default)]
pub struct SubscriberOptions {
    /// Higher runs first among the subscribers of one emission.
    pub priority: i32,
    /// Handler retries; `None` inherits the bus default.
    pub max_retries: Option<u32>,
    /// What to do once retries are exhausted.
    pub fallback: FallbackBehavior,
    /// Minimum interval between deliveries to this subscriber.
    pub rate_limit: Option<Duration>,
    /// Coalesce bursts into one delivery after this much quiet time.
    pub debounce: Option<Duration>,
    /// Event filter; empty accepts everything.
    pub event_patterns: Vec<EventPattern>,
    /// Transformations applied in order before delivery.
    pub transformations: Vec<Transformation>,
    /// Payloads for this subscriber are serialized as if crossing contexts.
    pub cross_context: bool,
}

impl SubscriberOptions {
    /// Default preferences.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the retry count.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the fallback behavior.
    pub fn fallback(mut self, fallback: FallbackBehavior) -> Self {
        self.fallback = fallback;
        self
    }

    /// Throttles deliveries to one per `interval`.
    pub fn rate_limit(mut self, interval: Duration) -> Self {
        self.rate_limit = Some(interval);
        self
    }

    /// Debounces deliveries by `quiet`.
    pub fn debounce(mut self, quiet: Duration) -> Self {
        self.debounce = Some(quiet);
        self
    }

    /// Adds a text event filter.
    pub fn pattern(mut self, text: impl Into<String>) -> Self {
        self.event_patterns.push(EventPattern::Text(text.into()));
        self
    }

    /// Adds a regex event filter.
    pub fn regex_pattern(mut self, source: &str) -> Result<Self, BusError> {
        let re = Regex::new(source).map_err(|e| BusError::InvalidPattern {
            pattern: source.to_owned(),
            error: e.to_string(),
        })?;
        self.event_patterns.push(EventPattern::Regex(re));
        Ok(self)
    }

    /// Appends a transformation.
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &mut EmitContext) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.transformations.push(Arc::new(f));
        self
    }

    /// Marks the subscriber as cross-context.
    pub fn cross_context(mut self, on: bool) -> Self {
        self.cross_context = on;
        self
    }

    /// Retries to use given the bus default.
    pub fn retries_or(&self, default: u32) -> u32 {
        self.max_retries.unwrap_or(default)
    }
}

impl fmt::Debug for SubscriberOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberOptions")
            .field("priority", &self.priority)
            .field("max_retries", &self.max_retries)
            .field("fallback", &self.fallback)
            .field("rate_limit", &self.rate_limit)
            .field("debounce", &self.debounce)
            .field("event_patterns", &self.event_patterns)
            .field("transformations", &self.transformations.len())
            .field("cross_context", &self.cross_context)
            .finish()
    }
}

/// Partial update applied by [`SubscriberManager::update_subscriber`](crate::SubscriberManager::update_subscriber).
#[derive(Clone, Debug, Default)]
pub struct SubscriberUpdate {
    /// New lifecycle state.
    pub state: Option<crate::bus::SubscriberState>,
    /// New priority.
    pub priority: Option<i32>,
    /// New retry count.
    pub max_retries: Option<u32>,
    /// New fallback.
    pub fallback: Option<FallbackBehavior>,
    /// New throttle interval (`Some(None)` clears it).
    pub rate_limit: Option<Option<Duration>>,
    /// New debounce window (`Some(None)` clears it).
    pub debounce: Option<Option<Duration>>,
}

impl SubscriberUpdate {
    /// Update that only changes the state.
    pub fn state(state: crate::bus::SubscriberState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }
}
