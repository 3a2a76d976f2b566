//! Router middleware.
//!
//! - On a subscription dispatch it announces interest in the event type.
//! - In `post_process` it forwards local emissions to interested contexts.
//! - [`Router::handle_inbound`] applies messages arriving from the transport.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::bus::{EmitContext, EmitReport, Emission, EventContext, SubscriberManager};
use crate::codec::Codec;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
use crate::middleware::{priority, Flow, Middleware};
use crate::routing::{Announcement, ChannelChain, ContextId, ContextRole, RoutedEvent, RoutingTable, WireMessage};
use crate::transport::TransportRef;

/// Router counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Interest announcements sent.
    pub announced: u64,
    /// Routed events sent or relayed.
    pub forwarded: u64,
    /// Routed events re-emitted locally.
    pub received: u64,
    /// Messages lost to transport or codec failures.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    announced: AtomicU64,
    forwarded: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

/// Cross-context routing middleware of one context.
pub struct Router {
    transport: TransportRef,
    chain: ChannelChain,
    codec: Arc<Codec>,
    table: RoutingTable,
    announced: Mutex<HashSet<String>>,
    counters: Counters,
    diagnostics: DiagnosticBus,
}

impl Router {
    /// Creates a router sending through the standard channel chain.
    pub fn new(
        transport: TransportRef,
        orchestrator: Option<ContextId>,
        codec: Arc<Codec>,
        diagnostics: DiagnosticBus,
    ) -> Self {
        let chain = ChannelChain::standard(transport.clone(), orchestrator, diagnostics.clone());
        Self::with_chain(transport, chain, codec, diagnostics)
    }

    /// Creates a router sending through `chain`.
    pub fn with_chain(
        transport: TransportRef,
        chain: ChannelChain,
        codec: Arc<Codec>,
        diagnostics: DiagnosticBus,
    ) -> Self {
        Self {
            transport,
            chain,
            codec,
            table: RoutingTable::new(),
            announced: Mutex::new(HashSet::new()),
            counters: Counters::default(),
            diagnostics,
        }
    }

    /// Local context.
    pub fn local(&self) -> &ContextId {
        self.transport.local()
    }

    fn is_orchestrator(&self) -> bool {
        self.transport.role() == ContextRole::Orchestrator
    }

    /// Remote contexts interested in `event`.
    pub fn remote_subscribers(&self, event: &str) -> BTreeSet<ContextId> {
        self.table.interested(event)
    }

    /// Copy of the routing table.
    pub fn routing_table(&self) -> BTreeMap<String, BTreeSet<ContextId>> {
        self.table.snapshot()
    }

    /// Counters snapshot.
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            announced: self.counters.announced.load(Ordering::Relaxed),
            forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    async fn announce(&self, event: &str) {
        if !self.announced.lock().insert(event.to_owned()) {
            return;
        }
        let msg = WireMessage::SubscriptionAnnouncement(Announcement {
            event_type: event.to_owned(),
            source_context: self.local().clone(),
            relayed_by: None,
        });
        match self.chain.send(&msg).await {
            Ok(channel) => {
                self.counters.announced.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(event, context = %self.local(), channel, "interest announced");
                self.diagnostics.publish(
                    Diagnostic::new(DiagnosticKind::InterestAnnounced)
                        .with_event(event)
                        .with_context(channel),
                );
            }
            Err(e) => self.drop_message(&msg, &e.to_string()),
        }
    }

    async fn forward(&self, emission: &Emission) {
        let local = self.local();
        let targets: Vec<ContextId> = self
            .table
            .interested(&emission.event)
            .into_iter()
            .filter(|c| c != local)
            .collect();
        if targets.is_empty() {
            return;
        }
        let data = match self.codec.serialize(&emission.data) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(event = %emission.event, error = %e, "cannot serialize routed payload");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.diagnostics.publish(
                    Diagnostic::new(DiagnosticKind::SerializationFailed)
                        .with_event(emission.event.clone())
                        .with_reason(e.as_label()),
                );
                return;
            }
        };

        let count = targets.len() as u64;
        let msg = WireMessage::RoutedEvent(RoutedEvent {
            original_event: emission.event.to_string(),
            data,
            source_context: local.clone(),
            targets,
            timestamp_ms: now_ms(),
            routed_by: None,
        });
        match self.chain.send(&msg).await {
            Ok(channel) => {
                self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(event = %emission.event, channel, targets = count, "event forwarded");
                self.diagnostics.publish(
                    Diagnostic::new(DiagnosticKind::EventForwarded)
                        .with_event(emission.event.clone())
                        .with_context(channel)
                        .with_count(count),
                );
            }
            Err(e) => self.drop_message(&msg, &e.to_string()),
        }
    }

    fn drop_message(&self, msg: &WireMessage, reason: &str) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            kind = msg.as_label(),
            event = msg.event_type(),
            context = %self.local(),
            reason,
            "message dropped"
        );
        self.diagnostics.publish(
            Diagnostic::new(DiagnosticKind::MessageDropped)
                .with_event(msg.event_type())
                .with_reason(reason),
        );
    }

    /// Applies one inbound message, re-emitting routed events on `manager`.
    pub async fn handle_inbound(&self, msg: WireMessage, manager: &SubscriberManager) {
        if msg.source() == self.local() {
            return;
        }
        match msg {
            WireMessage::SubscriptionAnnouncement(a) => self.on_announcement(a).await,
            WireMessage::RoutedEvent(r) => self.on_routed(r, manager).await,
        }
    }

    async fn on_announcement(&self, a: Announcement) {
        let fresh = self.table.record(&a.event_type, a.source_context.clone());
        tracing::debug!(
            event = %a.event_type,
            from = %a.source_context,
            fresh,
            "remote interest recorded"
        );
        if !fresh || !self.is_orchestrator() || a.relayed_by.is_some() {
            return;
        }
        let gossip = WireMessage::SubscriptionAnnouncement(Announcement {
            relayed_by: Some(self.local().clone()),
            ..a
        });
        if let Err(e) = self.transport.send_to_all(gossip.clone()).await {
            self.drop_message(&gossip, &e.to_string());
        }
    }

    async fn on_routed(&self, r: RoutedEvent, manager: &SubscriberManager) {
        let local = self.local().clone();

        if self.is_orchestrator() && r.routed_by.is_none() {
            for target in r.targets.iter().filter(|t| **t != local && **t != r.source_context) {
                let relay = WireMessage::RoutedEvent(RoutedEvent {
                    routed_by: Some(local.clone()),
                    ..r.clone()
                });
                match self.transport.send_to_one(target, relay).await {
                    Ok(()) => {
                        self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(event = %r.original_event, target = %target, reason, "relay failed");
                        self.diagnostics.publish(
                            Diagnostic::new(DiagnosticKind::MessageDropped)
                                .with_event(r.original_event.as_str())
                                .with_context(target.to_string())
                                .with_reason(reason),
                        );
                    }
                }
            }
        }

        if !r.targets.contains(&local) {
            return;
        }
        let data = match self.codec.deserialize(&r.data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(event = %r.original_event, error = %e, "cannot decode routed payload");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.diagnostics.publish(
                    Diagnostic::new(DiagnosticKind::SerializationFailed)
                        .with_event(r.original_event.as_str())
                        .with_reason(e.as_label()),
                );
                return;
            }
        };
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let routed_by = r.routed_by.unwrap_or_else(|| r.source_context.clone());
        let context = EmitContext {
            cross_context: true,
            source_context: Some(r.source_context),
            routed_by: Some(routed_by),
            ..EmitContext::default()
        };
        manager.emit(&r.original_event, data, context).await;
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[async_trait]
impl Middleware for Router {
    fn name(&self) -> &'static str {
        "router"
    }

    fn priority(&self) -> i32 {
        priority::ROUTING
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() {
            self.announce(&ctx.event).await;
        }
        Flow::Continue
    }

    async fn post_process(&self, emission: &Emission, _report: &EmitReport) {
        let c = &emission.context;
        if c.cross_context || c.subscription || c.is_replay() {
            return;
        }
        self.forward(emission).await;
    }
}
