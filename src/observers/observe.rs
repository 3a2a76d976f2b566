//! # Core observer trait
//!
//! `Observe` is the extension point for plugging custom diagnostic handlers into
//! a bus context. Each observer is driven by a dedicated worker fed by a bounded
//! queue owned by the [`ObserverSet`](crate::ObserverSet).
//!
//! ## Contract
//! - Implementations may be slow; they do **not** block the bus.
//! - On queue overflow, diagnostics for that observer are **dropped**.

use async_trait::async_trait;

use crate::diagnostics::Diagnostic;

/// Contract for diagnostic observers.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Handles a single diagnostic.
    async fn on_diagnostic(&self, diag: &Diagnostic);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this observer's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
