//! Bus diagnostics: types and broadcast channel.
//!
//! Diagnostics describe what happened *inside* the bus (a subscriber was
//! quarantined, a transport channel failed, an event is repeatedly slow).
//! They are separate from the application events carried by
//! [`SubscriberManager::emit`](crate::SubscriberManager::emit).
//!
//! ## Contents
//! - [`DiagnosticKind`], [`Diagnostic`] classification and metadata
//! - [`DiagnosticBus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the subscriber manager, middleware (recovery, metrics,
//!   serialization, transformation), the router and its channel chain.
//! - **Consumers**: [`ObserverSet`](crate::ObserverSet) fan-out, tests.

mod bus;
mod diagnostic;

pub use bus::DiagnosticBus;
pub use diagnostic::{Diagnostic, DiagnosticKind};
