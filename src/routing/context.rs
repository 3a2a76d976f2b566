use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of one execution context.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    /// Creates an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ContextId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Position of a context in the hub-and-spoke topology.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ContextRole {
    /// Hub: may fan out to every peer and relays between peers.
    Orchestrator,
    /// Spoke: talks to the orchestrator only.
    #[default]
    Peer,
}

impl ContextRole {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ContextRole::Orchestrator => "orchestrator",
            ContextRole::Peer => "peer",
        }
    }
}
