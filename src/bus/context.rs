//! # Context bag carried alongside every emission.
//!
//! [`EmitContext`] travels with the payload through the middleware chain.
//! Middleware read and stamp the typed flags; callers may attach free-form
//! attributes.

use std::collections::BTreeMap;

use crate::routing::ContextId;

/// Metadata of one emission.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmitContext {
    /// The emission arrived from another context.
    pub cross_context: bool,
    /// Context the emission originated in (set on routed emissions).
    pub source_context: Option<ContextId>,
    /// Context that delivered the routed message here.
    pub routed_by: Option<ContextId>,
    /// Replay of a batching window.
    pub batched: bool,
    /// Emitter opts into batching; throttling and storm control are skipped.
    pub batchable: bool,
    /// Coalesced re-delivery after a debounce window.
    pub debounced: bool,
    /// Payload was replaced by its codec envelope.
    pub serialized: bool,
    /// Synthetic context used when a subscriber is registered.
    pub subscription: bool,
    /// Categories the payload resolved into, ranked.
    pub categories: Vec<String>,
    /// Best category.
    pub primary_category: Option<String>,
    /// Free-form attributes.
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl EmitContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the emission as eligible for batching.
    pub fn batchable(mut self) -> Self {
        self.batchable = true;
        self
    }

    /// Marks the emission as cross-context.
    pub fn cross_context(mut self) -> Self {
        self.cross_context = true;
        self
    }

    /// Adds an attribute.
    pub fn attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// True for an emission that was already delivered through a replay path.
    pub(crate) fn is_replay(&self) -> bool {
        self.batched || self.debounced
    }
}
