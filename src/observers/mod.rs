//! # Diagnostic observers.
//!
//! This module provides the [`Observe`] trait and the [`ObserverSet`] fan-out
//! used to consume [`Diagnostic`](crate::Diagnostic)s published on the
//! [`DiagnosticBus`](crate::DiagnosticBus).
//!
//! ```text
//! Manager / middleware / router ── publish(Diagnostic) ──► DiagnosticBus
//!                                                              │
//!                                                              ▼
//!                                                         ObserverSet
//!                                                 ┌────────────┼────────────┐
//!                                                 ▼            ▼            ▼
//!                                             LogWriter     Metrics      Custom
//! ```

mod observe;
mod set;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use observe::Observe;
pub use set::ObserverSet;
