//! Messages exchanged between contexts.
//!
//! ```text
//! {"kind":"subscription-announcement","event_type":"ping","source_context":"A","relayed_by":null}
//! {"kind":"routed-event","original_event":"ping","data":{..envelope..},
//!  "source_context":"B","targets":["A"],"timestamp_ms":1700000000000,"routed_by":null}
//! ```

use serde::{Deserialize, Serialize};

use crate::routing::ContextId;

/// A context declares interest in an event type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    /// Event type subscribed to.
    pub event_type: String,
    /// Context that holds the subscriber.
    pub source_context: ContextId,
    /// Orchestrator that re-gossiped the announcement, if any.
    #[serde(default)]
    pub relayed_by: Option<ContextId>,
}

/// A local emission forwarded to interested contexts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutedEvent {
    /// Event type.
    pub original_event: String,
    /// Payload as a codec envelope.
    pub data: serde_json::Value,
    /// Context the emission happened in.
    pub source_context: ContextId,
    /// Contexts that should re-emit it.
    pub targets: Vec<ContextId>,
    /// Wall-clock send time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Orchestrator that relayed it, if any.
    #[serde(default)]
    pub routed_by: Option<ContextId>,
}

/// Everything a [`Transport`](crate::transport::Transport) carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WireMessage {
    /// Interest announcement.
    SubscriptionAnnouncement(Announcement),
    /// Forwarded emission.
    RoutedEvent(RoutedEvent),
}

impl WireMessage {
    /// Context the message originated in.
    pub fn source(&self) -> &ContextId {
        match self {
            WireMessage::SubscriptionAnnouncement(a) => &a.source_context,
            WireMessage::RoutedEvent(r) => &r.source_context,
        }
    }

    /// Event type the message is about.
    pub fn event_type(&self) -> &str {
        match self {
            WireMessage::SubscriptionAnnouncement(a) => &a.event_type,
            WireMessage::RoutedEvent(r) => &r.original_event,
        }
    }

    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            WireMessage::SubscriptionAnnouncement(_) => "subscription-announcement",
            WireMessage::RoutedEvent(_) => "routed-event",
        }
    }
}
