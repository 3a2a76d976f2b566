//! Ordered delivery strategies.
//!
//! ```text
//! ChannelChain::send(msg)
//!   direct  ─Err─► fan-out ─Err─► durable ─Err─► dropped
//!     └Ok──────────┴Ok─────────────┴Ok──► sent
//! ```

use async_trait::async_trait;

use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
use crate::error::TransportError;
use crate::routing::{ContextId, ContextRole, WireMessage};
use crate::transport::TransportRef;

/// Durable key every context writes its outbound messages to.
pub const DURABLE_KEY: &str = "relaybus:messages";

/// One delivery strategy.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// Stable name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Sends `msg`; returns how many contexts it reached directly.
    async fn send(&self, msg: &WireMessage) -> Result<usize, TransportError>;
}

/// Point-to-point send to the orchestrator. Unsupported in the orchestrator itself.
pub struct DirectChannel {
    transport: TransportRef,
    orchestrator: Option<ContextId>,
}

impl DirectChannel {
    /// Creates the channel.
    pub fn new(transport: TransportRef, orchestrator: Option<ContextId>) -> Self {
        Self {
            transport,
            orchestrator,
        }
    }
}

#[async_trait]
impl Channel for DirectChannel {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn send(&self, msg: &WireMessage) -> Result<usize, TransportError> {
        let target = match &self.orchestrator {
            Some(o) if self.transport.role() != ContextRole::Orchestrator && o != self.transport.local() => o,
            _ => {
                return Err(TransportError::Unsupported {
                    channel: "direct",
                    reason: "no orchestrator to send to".into(),
                })
            }
        };
        self.transport.send_to_one(target, msg.clone()).await?;
        Ok(1)
    }
}

/// Privileged send to every peer.
pub struct FanOutChannel {
    transport: TransportRef,
}

impl FanOutChannel {
    /// Creates the channel.
    pub fn new(transport: TransportRef) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Channel for FanOutChannel {
    fn name(&self) -> &'static str {
        "fan-out"
    }

    async fn send(&self, msg: &WireMessage) -> Result<usize, TransportError> {
        self.transport.send_to_all(msg.clone()).await
    }
}

/// Write to the shared durable store.
pub struct DurableChannel {
    transport: TransportRef,
    key: String,
}

impl DurableChannel {
    /// Creates the channel writing to [`DURABLE_KEY`].
    pub fn new(transport: TransportRef) -> Self {
        Self {
            transport,
            key: DURABLE_KEY.to_owned(),
        }
    }
}

#[async_trait]
impl Channel for DurableChannel {
    fn name(&self) -> &'static str {
        "durable"
    }

    async fn send(&self, msg: &WireMessage) -> Result<usize, TransportError> {
        let value = serde_json::to_value(msg).map_err(|e| TransportError::Rejected {
            reason: e.to_string(),
        })?;
        self.transport.durable_broadcast(&self.key, value).await?;
        Ok(0)
    }
}

/// First-success chain of channels.
pub struct ChannelChain {
    channels: Vec<Box<dyn Channel>>,
    diagnostics: DiagnosticBus,
}

impl ChannelChain {
    /// Chain over the given channels, tried in order.
    pub fn new(channels: Vec<Box<dyn Channel>>, diagnostics: DiagnosticBus) -> Self {
        Self {
            channels,
            diagnostics,
        }
    }

    /// direct → fan-out → durable.
    pub fn standard(transport: TransportRef, orchestrator: Option<ContextId>, diagnostics: DiagnosticBus) -> Self {
        Self::new(
            vec![
                Box::new(DirectChannel::new(transport.clone(), orchestrator)),
                Box::new(FanOutChannel::new(transport.clone())),
                Box::new(DurableChannel::new(transport)),
            ],
            diagnostics,
        )
    }

    /// Names of the channels in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Sends through the first channel that accepts `msg`; returns its name.
    pub async fn send(&self, msg: &WireMessage) -> Result<&'static str, TransportError> {
        let mut last = TransportError::Unsupported {
            channel: "chain",
            reason: "no channels configured".into(),
        };
        for ch in &self.channels {
            match ch.send(msg).await {
                Ok(_) => return Ok(ch.name()),
                Err(e) => {
                    tracing::debug!(
                        channel = ch.name(),
                        kind = msg.as_label(),
                        event = msg.event_type(),
                        error = %e,
                        "channel failed, trying next"
                    );
                    if !matches!(e, TransportError::Unsupported { .. }) {
                        self.diagnostics.publish(
                            Diagnostic::new(DiagnosticKind::ChannelFailed)
                                .with_event(msg.event_type())
                                .with_context(ch.name())
                                .with_reason(e.to_string()),
                        );
                    }
                    last = e;
                }
            }
        }
        Err(last)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::routing::Announcement;
    use crate::transport::InMemoryHub;

    fn msg() -> WireMessage {
        WireMessage::SubscriptionAnnouncement(Announcement {
            event_type: "ping".into(),
            source_context: ContextId::from("A"),
            relayed_by: None,
        })
    }

    #[tokio::test]
    async fn falls_through_to_durable_when_orchestrator_is_gone() {
        let hub = InMemoryHub::new();
        let (a, _rx) = hub.attach("A", ContextRole::Peer);
        let chain = ChannelChain::standard(a, Some(ContextId::from("bg")), DiagnosticBus::new(8));
        assert_eq!(chain.names(), vec!["direct", "fan-out", "durable"]);
        assert_eq!(chain.send(&msg()).await.unwrap(), "durable");
        assert!(hub.durable_value(DURABLE_KEY).is_some());
    }

    #[tokio::test]
    async fn direct_wins_when_reachable() {
        let hub = InMemoryHub::new();
        let (_bg, mut bg_rx) = hub.attach("bg", ContextRole::Orchestrator);
        let (a, _rx) = hub.attach("A", ContextRole::Peer);
        let chain = ChannelChain::standard(a, Some(ContextId::from("bg")), DiagnosticBus::new(8));
        assert_eq!(chain.send(&msg()).await.unwrap(), "direct");
        assert_eq!(bg_rx.try_recv().unwrap(), msg());
    }

    #[tokio::test]
    async fn closed_hub_drops() {
        let hub = InMemoryHub::new();
        let (a, _rx) = hub.attach("A", ContextRole::Peer);
        let chain = ChannelChain::new(
            vec![Box::new(DurableChannel::new(Arc::clone(&a) as TransportRef))],
            DiagnosticBus::new(8),
        );
        hub.close();
        assert_eq!(chain.send(&msg()).await.unwrap_err(), TransportError::Closed);
    }
}
