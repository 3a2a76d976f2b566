//! # Bus context.
//!
//! A [`BusNode`] is one execution context's bus: it owns the subscriber
//! manager, the router, the category registry, the codec and the diagnostics
//! bus, and runs the background tasks that feed them.
//!
//! ```text
//! BusNode::builder(id, config)
//!   .transport(t, inbound) ──► Router (priority 600) + inbound pump
//!   .with_default_pipeline() ─► validation, loop guard, rate limit, categorize,
//!                               filter, transform, serialization, batching,
//!                               delivery, metrics
//!   .observers(..) ───────────► ObserverSet listening on the DiagnosticBus
//!   .build()
//!
//! background tasks (cancelled by shutdown()):
//!   inbound pump:  transport queue + durable changes ─► Router::handle_inbound
//!   idle sweeper:  every sweep_interval ─► sweep_inactive(inactive_after)
//!   observers:     DiagnosticBus ─► ObserverSet::emit
//! ```
//!
//! ## Example
//! ```rust
//! use relaybus::{BusConfig, BusNode, Delivery, EmitContext, HandlerError, HandlerFn, SubscriberOptions, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = BusNode::builder("popup", BusConfig::default())
//!         .with_default_pipeline()
//!         .build()?;
//!
//!     let echo = HandlerFn::arc("echo", |d: Delivery| async move { Ok::<_, HandlerError>(d.data) });
//!     node.subscribe("greet", echo, SubscriberOptions::new()).await?;
//!
//!     let report = node.emit("greet", "hello", EmitContext::new()).await;
//!     assert_eq!(report.delivered().next(), Some(&Value::from("hello")));
//!
//!     node.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{
    EmitContext, EmitReport, HandlerRef, SubscriberManager, SubscriberOptions, SubscriptionGroup, Unsubscribe,
};
use crate::categories::CategoryRegistry;
use crate::codec::Codec;
use crate::config::BusConfig;
use crate::diagnostics::DiagnosticBus;
use crate::error::BusError;
use crate::middleware::{
    BatchStrategy, Batching, Categorize, ErrorRecovery, EventFilter, LoopGuard, Metrics, MiddlewareRef, RateLimit,
    RateRule, Serialization, StateValidation, Transform,
};
use crate::observers::{Observe, ObserverSet};
use crate::routing::{ContextId, ContextRole, Router, WireMessage, DURABLE_KEY};
use crate::transport::TransportRef;
use crate::value::Value;

/// Builder for [`BusNode`].
pub struct BusNodeBuilder {
    id: ContextId,
    config: BusConfig,
    orchestrator: Option<ContextId>,
    transport: Option<(TransportRef, mpsc::UnboundedReceiver<WireMessage>)>,
    default_pipeline: bool,
    rate_rules: Vec<(String, RateRule)>,
    batch_rules: Vec<(String, BatchStrategy, Option<Duration>)>,
    middlewares: Vec<MiddlewareRef>,
    observers: Vec<Arc<dyn Observe>>,
    categories: Option<Arc<CategoryRegistry>>,
}

impl BusNodeBuilder {
    fn new(id: ContextId, config: BusConfig) -> Self {
        Self {
            id,
            config,
            orchestrator: None,
            transport: None,
            default_pipeline: false,
            rate_rules: Vec::new(),
            batch_rules: Vec::new(),
            middlewares: Vec::new(),
            observers: Vec::new(),
            categories: None,
        }
    }

    /// Context that relays between peers. Peers send to it directly.
    pub fn orchestrator(mut self, id: impl Into<ContextId>) -> Self {
        self.orchestrator = Some(id.into());
        self
    }

    /// Connects the node to other contexts.
    ///
    /// `inbound` is the queue the transport delivers this context's messages to.
    pub fn transport(mut self, transport: TransportRef, inbound: mpsc::UnboundedReceiver<WireMessage>) -> Self {
        self.transport = Some((transport, inbound));
        self
    }

    /// Installs the built-in middleware.
    pub fn with_default_pipeline(mut self) -> Self {
        self.default_pipeline = true;
        self
    }

    /// Throttles event types matching `pattern` (default pipeline only).
    pub fn throttle(mut self, pattern: impl Into<String>, interval: Duration) -> Self {
        self.rate_rules.push((pattern.into(), RateRule::Throttle(interval)));
        self
    }

    /// Debounces event types matching `pattern` (default pipeline only).
    pub fn debounce(mut self, pattern: impl Into<String>, quiet: Duration) -> Self {
        self.rate_rules.push((pattern.into(), RateRule::Debounce(quiet)));
        self
    }

    /// Batches event types matching `pattern` (default pipeline only).
    pub fn batch(mut self, pattern: impl Into<String>, strategy: BatchStrategy, delay: Option<Duration>) -> Self {
        self.batch_rules.push((pattern.into(), strategy, delay));
        self
    }

    /// Adds a custom middleware.
    pub fn middleware(mut self, mw: MiddlewareRef) -> Self {
        self.middlewares.push(mw);
        self
    }

    /// Diagnostic observers.
    pub fn observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers = observers;
        self
    }

    /// Uses an existing category registry instead of an empty one.
    pub fn categories(mut self, registry: Arc<CategoryRegistry>) -> Self {
        self.categories = Some(registry);
        self
    }

    /// Builds the node and spawns its background tasks.
    ///
    /// Must be called inside a tokio runtime. Fails if a rule pattern does not compile.
    pub fn build(self) -> Result<BusNode, BusError> {
        let cfg = self.config;
        let token = CancellationToken::new();
        let diagnostics = DiagnosticBus::new(cfg.diagnostics_capacity_clamped());
        let codec = Arc::new(Codec::new(cfg.codec_max_depth));
        let categories = self
            .categories
            .unwrap_or_else(|| Arc::new(CategoryRegistry::new(cfg.validator_timeout)));

        let (transport, inbound) = match self.transport {
            Some((t, rx)) => (Some(t), Some(rx)),
            None => (None, None),
        };
        let role = transport.as_ref().map_or(ContextRole::Peer, |t| t.role());
        let router = transport.as_ref().map(|t| {
            Arc::new(Router::new(
                Arc::clone(t),
                self.orchestrator.clone(),
                Arc::clone(&codec),
                diagnostics.clone(),
            ))
        });

        let mut pipeline: Vec<MiddlewareRef> = Vec::new();
        let mut metrics = None;
        if self.default_pipeline {
            let mut rate = RateLimit::new(token.child_token()).sweep_interval(cfg.sweep_interval);
            for (pattern, rule) in &self.rate_rules {
                rate = rate.rule(pattern, *rule)?;
            }
            let mut batching = Batching::new(token.child_token(), cfg.batch_delay);
            for (pattern, strategy, delay) in &self.batch_rules {
                batching = batching.rule(pattern, *strategy, *delay)?;
            }
            let m = Arc::new(Metrics::new(self.id.clone(), &cfg, diagnostics.clone()));
            metrics = Some(Arc::clone(&m));

            pipeline.push(Arc::new(StateValidation::new(diagnostics.clone())));
            pipeline.push(Arc::new(LoopGuard::new(&cfg, diagnostics.clone())));
            pipeline.push(Arc::new(rate));
            pipeline.push(Arc::new(Categorize::new(Arc::clone(&categories))));
            pipeline.push(Arc::new(EventFilter::new()));
            pipeline.push(Arc::new(Transform::new(diagnostics.clone())));
            pipeline.push(Arc::new(Serialization::new(Arc::clone(&codec), diagnostics.clone())));
            pipeline.push(Arc::new(batching));
            pipeline.push(Arc::new(ErrorRecovery::new(&cfg, diagnostics.clone())));
            pipeline.push(m);
        }
        if let Some(r) = &router {
            pipeline.push(r.clone());
        }
        pipeline.extend(self.middlewares);

        let manager = SubscriberManager::builder(&cfg)
            .diagnostics(diagnostics.clone())
            .middlewares(pipeline)
            .build();

        let mut tasks = Vec::new();
        let mut observers = None;
        if !self.observers.is_empty() {
            let set = Arc::new(ObserverSet::new(self.observers, diagnostics.clone()));
            tasks.push(set.listen(token.child_token()));
            observers = Some(set);
        }
        if let (Some(router), Some(transport), Some(inbound)) = (&router, &transport, inbound) {
            tasks.push(spawn_inbound(
                Arc::clone(router),
                transport,
                inbound,
                manager.clone(),
                token.child_token(),
            ));
        }
        if let Some(limit) = cfg.inactivity_limit() {
            tasks.push(spawn_sweeper(manager.handle(), cfg.sweep_interval, limit, token.child_token()));
        }

        tracing::debug!(
            context = %self.id,
            role = role.as_label(),
            middlewares = ?manager.middleware_names(),
            "bus context started"
        );

        Ok(BusNode {
            id: self.id,
            role,
            config: cfg,
            manager,
            router,
            categories,
            codec,
            metrics,
            diagnostics,
            observers: Mutex::new(observers),
            tasks: Mutex::new(tasks),
            token,
        })
    }
}

fn spawn_inbound(
    router: Arc<Router>,
    transport: &TransportRef,
    mut inbound: mpsc::UnboundedReceiver<WireMessage>,
    manager: SubscriberManager,
    token: CancellationToken,
) -> JoinHandle<()> {
    let (durable_tx, mut durable_rx) = mpsc::unbounded_channel::<WireMessage>();
    let listener = Arc::new(move |_key: &str, value: &serde_json::Value| {
        match serde_json::from_value::<WireMessage>(value.clone()) {
            Ok(msg) => {
                let _ = durable_tx.send(msg);
            }
            Err(e) => tracing::debug!(error = %e, "ignoring foreign durable value"),
        }
    });
    if let Err(e) = transport.on_durable_change(DURABLE_KEY, listener) {
        tracing::warn!(error = %e, "durable channel unavailable");
    }

    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = token.cancelled() => break,
                msg = inbound.recv() => match msg {
                    Some(m) => m,
                    None => break,
                },
                Some(msg) = durable_rx.recv() => msg,
            };
            router.handle_inbound(msg, &manager).await;
        }
    })
}

fn spawn_sweeper(
    bus: crate::bus::BusHandle,
    every: Duration,
    limit: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    let Some(manager) = bus.manager() else { break };
                    let removed = manager.sweep_inactive(limit);
                    if removed > 0 {
                        tracing::debug!(removed, "idle subscribers swept");
                    }
                }
            }
        }
    })
}

/// One context's bus.
pub struct BusNode {
    id: ContextId,
    role: ContextRole,
    config: BusConfig,
    manager: SubscriberManager,
    router: Option<Arc<Router>>,
    categories: Arc<CategoryRegistry>,
    codec: Arc<Codec>,
    metrics: Option<Arc<Metrics>>,
    diagnostics: DiagnosticBus,
    observers: Mutex<Option<Arc<ObserverSet>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    token: CancellationToken,
}

impl BusNode {
    /// Starts building the context `id`.
    pub fn builder(id: impl Into<ContextId>, config: BusConfig) -> BusNodeBuilder {
        BusNodeBuilder::new(id.into(), config)
    }

    /// Context id.
    pub fn id(&self) -> &ContextId {
        &self.id
    }

    /// Role in the topology.
    pub fn role(&self) -> ContextRole {
        self.role
    }

    /// Configuration the node was built with.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Subscriber manager.
    pub fn manager(&self) -> &SubscriberManager {
        &self.manager
    }

    /// Router, if a transport is connected.
    pub fn router(&self) -> Option<&Arc<Router>> {
        self.router.as_ref()
    }

    /// Category registry.
    pub fn categories(&self) -> &Arc<CategoryRegistry> {
        &self.categories
    }

    /// Payload codec.
    pub fn codec(&self) -> &Arc<Codec> {
        &self.codec
    }

    /// Metrics middleware of the default pipeline.
    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Diagnostics bus.
    pub fn diagnostics(&self) -> &DiagnosticBus {
        &self.diagnostics
    }

    /// Registers a subscriber.
    pub async fn subscribe(
        &self,
        event_type: &str,
        handler: HandlerRef,
        options: SubscriberOptions,
    ) -> Result<Unsubscribe, BusError> {
        self.manager.subscribe(event_type, handler, options).await
    }

    /// New subscription group on this context's manager.
    pub fn group(&self) -> SubscriptionGroup {
        SubscriptionGroup::new(self.manager.handle())
    }

    /// Emits an event in this context.
    pub async fn emit(&self, event_type: &str, data: impl Into<Value>, context: EmitContext) -> EmitReport {
        self.manager.emit(event_type, data.into(), context).await
    }

    /// Stops timers and background tasks, destroys every subscriber and drains the observers.
    pub async fn shutdown(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        self.manager.destroy();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for t in tasks {
            let _ = t.await;
        }
        let observers = self.observers.lock().take();
        if let Some(set) = observers {
            match Arc::try_unwrap(set) {
                Ok(set) => set.shutdown().await,
                Err(_) => tracing::debug!("observer set still shared, not drained"),
            }
        }
        tracing::debug!(context = %self.id, "bus context stopped");
    }
}

impl Drop for BusNode {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Delivery, HandlerFn};
    use crate::error::HandlerError;

    #[tokio::test]
    async fn default_pipeline_order() {
        let node = BusNode::builder("solo", BusConfig::default())
            .with_default_pipeline()
            .build()
            .unwrap();
        assert_eq!(
            node.manager().middleware_names(),
            vec![
                "state-validation",
                "loop-guard",
                "rate-limit",
                "categorize",
                "event-filter",
                "transform",
                "serialization",
                "batching",
                "error-recovery",
                "metrics",
            ]
        );
        assert!(node.router().is_none());
    }

    #[tokio::test]
    async fn bad_rule_fails_the_build() {
        let err = BusNode::builder("solo", BusConfig::default())
            .with_default_pipeline()
            .throttle("(", Duration::from_millis(5))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "bus_invalid_pattern");
    }

    #[tokio::test]
    async fn shutdown_destroys_subscribers() {
        let node = BusNode::builder("solo", BusConfig::default()).build().unwrap();
        let h = HandlerFn::arc("noop", |_d: Delivery| async { Ok::<_, HandlerError>(Value::Null) });
        node.subscribe("x", h.clone(), SubscriberOptions::new()).await.unwrap();
        node.shutdown().await;
        assert_eq!(
            node.subscribe("x", h, SubscriberOptions::new()).await.unwrap_err(),
            BusError::Destroyed
        );
        assert_eq!(node.emit("x", Value::Null, EmitContext::new()).await.subscriber_count, 0);
    }
}
