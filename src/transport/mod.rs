//! # Transports between contexts.
//!
//! A [`Transport`] is what one context has to reach the others: a
//! point-to-point send, a privileged fan-out (orchestrator only) and a durable
//! key/value store whose changes are observed by every other context.
//!
//! [`InMemoryHub`] wires several contexts inside one process.

mod memory;

pub use memory::{HubTransport, InMemoryHub};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::routing::{ContextId, ContextRole, WireMessage};

/// Callback invoked with `(key, new value)` when a durable key changes.
pub type DurableListener = Arc<dyn Fn(&str, &serde_json::Value) + Send + Sync>;

/// Message transport of one context.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Context this transport belongs to.
    fn local(&self) -> &ContextId;

    /// Role of the local context.
    fn role(&self) -> ContextRole;

    /// Sends to one context.
    async fn send_to_one(&self, target: &ContextId, msg: WireMessage) -> Result<(), TransportError>;

    /// Sends to every other context; returns how many were reached.
    ///
    /// Fails with [`TransportError::Unsupported`] unless the local context is the orchestrator.
    async fn send_to_all(&self, msg: WireMessage) -> Result<usize, TransportError>;

    /// Writes a durable key; listeners in other contexts observe the change.
    async fn durable_broadcast(&self, key: &str, value: serde_json::Value) -> Result<(), TransportError>;

    /// Registers a change listener for `key`.
    fn on_durable_change(&self, key: &str, listener: DurableListener) -> Result<(), TransportError>;
}

/// Shared handle to a transport.
pub type TransportRef = Arc<dyn Transport>;
