use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::RwLock;

use crate::bus::WILDCARD;
use crate::routing::ContextId;

/// Event type → remote contexts known to be interested. Entries are never removed.
#[derive(Debug, Default)]
pub struct RoutingTable {
    remote: RwLock<HashMap<String, BTreeSet<ContextId>>>,
}

impl RoutingTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records interest; returns `false` if it was already known.
    pub fn record(&self, event: &str, context: ContextId) -> bool {
        self.remote
            .write()
            .entry(event.to_owned())
            .or_default()
            .insert(context)
    }

    /// Contexts interested in `event`, including wildcard subscribers.
    pub fn interested(&self, event: &str) -> BTreeSet<ContextId> {
        let remote = self.remote.read();
        let mut out = remote.get(event).cloned().unwrap_or_default();
        if event != WILDCARD {
            if let Some(any) = remote.get(WILDCARD) {
                out.extend(any.iter().cloned());
            }
        }
        out
    }

    /// Copy of the whole table.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<ContextId>> {
        self.remote
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
