//! # Fallback behavior after retries are exhausted.
//!
//! [`FallbackBehavior`] decides what the delivery reports once a handler has
//! failed `max_retries + 1` times:
//!
//! ```text
//! Ignore        → pretend success (response = null)
//! Fallback(h)   → run h once; its result becomes the response, its error a failure
//! Log (default) → log the error and report the delivery as failed
//! ```

use std::fmt;

use crate::bus::HandlerRef;

/// What to do with a delivery whose handler kept failing.
#[derive(Clone, Default)]
pub enum FallbackBehavior {
    /// Swallow the failure and report success.
    Ignore,
    /// Invoke an alternate handler with the same delivery.
    Fallback(HandlerRef),
    /// Log the failure and report it to the emitter (default).
    #[default]
    Log,
}

impl FallbackBehavior {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            FallbackBehavior::Ignore => "ignore",
            FallbackBehavior::Fallback(_) => "fallback",
            FallbackBehavior::Log => "log",
        }
    }
}

impl fmt::Debug for FallbackBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackBehavior::Fallback(h) => f.debug_tuple("Fallback").field(&h.name()).finish(),
            other => f.write_str(other.as_label()),
        }
    }
}
