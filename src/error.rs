//! Error types used by the bus, its collaborators and subscriber handlers.
//!
//! - [`BusError`]: errors raised by the subscriber manager itself.
//! - [`HandlerError`]: errors returned by subscriber handlers (retried by the pipeline).
//! - [`TransportError`]: failures of a single delivery channel.
//! - [`CodecError`]: payload serialization failures.
//! - [`CategoryError`]: category registration failures.
//!
//! Every enum provides `as_label` (stable snake_case for logs/metrics).
//! A middleware veto is **not** an error: it is expressed as
//! [`Flow::Block`](crate::Flow::Block).

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the subscriber manager.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The manager was destroyed; no new subscriptions are accepted.
    #[error("subscriber manager has been destroyed")]
    Destroyed,

    /// An event filter or rate-limit pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {error}")]
    InvalidPattern {
        /// The offending pattern source.
        pattern: String,
        /// Compiler message.
        error: String,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use relaybus::BusError;
    ///
    /// assert_eq!(BusError::Destroyed.as_label(), "bus_destroyed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::Destroyed => "bus_destroyed",
            BusError::InvalidPattern { .. } => "bus_invalid_pattern",
        }
    }
}

/// # Errors returned by subscriber handlers.
///
/// `Fail` and `Timeout` are retried by the error-recovery middleware,
/// `Fatal` skips the remaining retries and goes straight to the fallback.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Handler failed but may succeed if retried.
    #[error("handler failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error (no further retries).
    #[error("fatal handler error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Handler exceeded a caller-imposed deadline.
    #[error("handler timed out after {timeout:?}")]
    Timeout {
        /// The exceeded deadline.
        timeout: Duration,
    },
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        HandlerError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`HandlerError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        HandlerError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Fatal { .. } => "handler_fatal",
            HandlerError::Timeout { .. } => "handler_timeout",
        }
    }

    /// Indicates whether the error type is safe to retry.
    ///
    /// # Example
    /// ```
    /// use relaybus::HandlerError;
    ///
    /// assert!(HandlerError::fail("boom").is_retryable());
    /// assert!(!HandlerError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Fail { .. } | HandlerError::Timeout { .. })
    }
}

/// # Errors produced by a single delivery channel.
///
/// The channel chain catches these and tries the next channel; only when
/// every channel failed is the message dropped.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The channel cannot carry this message from this context (e.g. fan-out from a peer).
    #[error("channel '{channel}' unsupported here: {reason}")]
    Unsupported {
        /// Channel name.
        channel: &'static str,
        /// Why it is not applicable.
        reason: String,
    },

    /// The destination context is not connected.
    #[error("context '{target}' unreachable")]
    Unreachable {
        /// Destination context id.
        target: String,
    },

    /// The transport was shut down.
    #[error("transport closed")]
    Closed,

    /// The message could not be encoded for the wire.
    #[error("message rejected: {reason}")]
    Rejected {
        /// Encoding failure details.
        reason: String,
    },
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Unsupported { .. } => "transport_unsupported",
            TransportError::Unreachable { .. } => "transport_unreachable",
            TransportError::Closed => "transport_closed",
            TransportError::Rejected { .. } => "transport_rejected",
        }
    }
}

/// # Errors produced by the payload codec.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Nesting exceeded the configured maximum depth.
    #[error("payload nesting exceeds max depth {max_depth}")]
    DepthExceeded {
        /// Configured limit.
        max_depth: usize,
    },

    /// An envelope did not have the expected shape.
    #[error("malformed envelope: {reason}")]
    Malformed {
        /// What was wrong.
        reason: String,
    },

    /// A `{__ref}` pointed at an id never defined in the same envelope.
    #[error("dangling reference id {id}")]
    DanglingRef {
        /// The unresolved id.
        id: u64,
    },
}

impl CodecError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CodecError::DepthExceeded { .. } => "codec_depth_exceeded",
            CodecError::Malformed { .. } => "codec_malformed",
            CodecError::DanglingRef { .. } => "codec_dangling_ref",
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            reason: reason.into(),
        }
    }
}

/// # Errors produced by the category registry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CategoryError {
    /// Linking the category under `parent` would create a cycle.
    #[error("category '{id}' cannot have parent '{parent}': cycle detected")]
    Cycle {
        /// Category being registered.
        id: String,
        /// Requested parent.
        parent: String,
    },

    /// A pattern failed to compile.
    #[error("category '{id}' has invalid pattern {pattern:?}: {error}")]
    InvalidPattern {
        /// Category being registered.
        id: String,
        /// Pattern source.
        pattern: String,
        /// Compiler message.
        error: String,
    },
}

impl CategoryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CategoryError::Cycle { .. } => "category_cycle",
            CategoryError::InvalidPattern { .. } => "category_invalid_pattern",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(HandlerError::fail("x").as_label(), "handler_failed");
        assert_eq!(TransportError::Closed.as_label(), "transport_closed");
        assert_eq!(
            CodecError::DepthExceeded { max_depth: 3 }.as_label(),
            "codec_depth_exceeded"
        );
        assert_eq!(
            CategoryError::Cycle {
                id: "a".into(),
                parent: "b".into()
            }
            .as_label(),
            "category_cycle"
        );
    }

    #[test]
    fn timeout_is_retryable() {
        let err = HandlerError::Timeout {
            timeout: Duration::from_secs(1),
        };
        assert!(err.is_retryable());
    }
}
