//! # Broadcast channel for bus diagnostics.
//!
//! [`DiagnosticBus`] is a thin wrapper around [`tokio::sync::broadcast`].
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks and never fails.
//! - **Bounded capacity**: one ring buffer shared by all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` items.
//! - **No persistence**: diagnostics are lost if nobody listens.

use tokio::sync::broadcast;

use super::diagnostic::Diagnostic;

/// Broadcast channel for diagnostics.
///
/// Cheap to clone (internally an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct DiagnosticBus {
    tx: broadcast::Sender<Diagnostic>,
}

impl DiagnosticBus {
    /// Creates a new bus with the given capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Diagnostic>(capacity.max(1));
        Self { tx }
    }

    /// Publishes a diagnostic to all current receivers.
    pub fn publish(&self, diag: Diagnostic) {
        let _ = self.tx.send(diag);
    }

    /// Creates an independent receiver observing diagnostics sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Diagnostic> {
        self.tx.subscribe()
    }
}

impl Default for DiagnosticBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
