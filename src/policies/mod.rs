//! Retry, quarantine and fallback policies.
//!
//! These knobs control **how long** the delivery middleware waits between
//! handler attempts, **when** a subscriber is suspended, and **what** is
//! reported once retries are exhausted.
//!
//! ## Contents
//! - [`BackoffPolicy`]    how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]     randomization strategy to avoid lockstep retries
//! - [`QuarantinePolicy`] exponentially growing suspension of failing subscribers
//! - [`FallbackBehavior`] ignore / fallback handler / log after exhaustion
//!
//! ## Quick wiring
//! ```text
//! SubscribeOptions { max_retries, fallback }
//!      └─► middleware::ErrorRecovery uses:
//!           - backoff.next(retry) between attempts
//!           - quarantine.suspension(failure_count) after exhaustion
//!           - fallback to shape the final response
//! ```

mod backoff;
mod fallback;
mod jitter;
mod quarantine;

pub use backoff::BackoffPolicy;
pub use fallback::FallbackBehavior;
pub use jitter::JitterPolicy;
pub use quarantine::QuarantinePolicy;
