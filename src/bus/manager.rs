//! # Subscriber manager.
//!
//! Per-context registry of (event type → subscribers) that dispatches every
//! `emit()` through the middleware pipeline.
//!
//! ```text
//! subscribe(event, handler, opts)
//!   └─► Subscriber{middleware sorted by priority}
//!         └─► one synthetic dispatch with context.subscription = true
//!
//! emit(event, data, ctx)
//!   ├─► subscribers of `event` + `*`, priority desc, then subscription order
//!   ├─► for each: run the whole chain (Continue / Replace / Block) to completion
//!   └─► every middleware: post_process(emission, report)
//! ```
//!
//! ## Rules
//! - Locks are taken only to snapshot state; none is held across `.await`.
//! - A blocked or failing subscriber never aborts its siblings or the caller.
//! - The global middleware list is append-only; additions reach every existing subscriber.
//! - After [`SubscriberManager::destroy`], `subscribe` fails and `emit` returns an empty report.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::bus::context::EmitContext;
use crate::bus::event_context::EventContext;
use crate::bus::handler::HandlerRef;
use crate::bus::options::{SubscriberOptions, SubscriberUpdate};
use crate::bus::report::{EmitReport, Emission, Outcome};
use crate::bus::subscriber::{Subscriber, SubscriberId, SubscriberState};
use crate::config::BusConfig;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
use crate::error::BusError;
use crate::middleware::{ErrorRecovery, Flow, MiddlewareRef};
use crate::value::Value;

/// Wildcard event type receiving every emission.
pub const WILDCARD: &str = "*";

/// Per-event emission counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventStats {
    /// Number of `emit()` calls.
    pub emitted: u64,
    /// Time of the last `emit()`.
    pub last_emitted: Instant,
}

/// Subscriber population summary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Registered subscribers.
    pub total: usize,
    /// Count per lifecycle state label.
    pub by_state: BTreeMap<&'static str, usize>,
    /// Currently quarantined.
    pub quarantined: usize,
    /// Count per event type.
    pub by_event: BTreeMap<String, usize>,
    /// Sum of execution counts.
    pub executions: u64,
}

struct Inner {
    middlewares: RwLock<Vec<MiddlewareRef>>,
    subscribers: RwLock<HashMap<Arc<str>, Vec<Arc<Subscriber>>>>,
    events: Mutex<HashMap<Arc<str>, EventStats>>,
    next_subscriber: AtomicU64,
    next_emit: AtomicU64,
    destroyed: AtomicBool,
    diagnostics: DiagnosticBus,
}

/// Weak handle to a manager, held by middleware that re-emit from timers.
#[derive(Clone)]
pub struct BusHandle(Weak<Inner>);

impl BusHandle {
    /// Upgrades to the manager, `None` once it was dropped.
    pub fn manager(&self) -> Option<SubscriberManager> {
        self.0.upgrade().map(|inner| SubscriberManager { inner })
    }

    /// Emits through the manager; `None` if it is gone.
    pub async fn emit(&self, event: &str, data: Value, context: EmitContext) -> Option<EmitReport> {
        let manager = self.manager()?;
        Some(manager.emit(event, data, context).await)
    }

    /// Re-runs one subscriber's chain; `None` if the manager or subscriber is gone.
    pub async fn redeliver(
        &self,
        subscriber: SubscriberId,
        event: &str,
        data: Value,
        context: EmitContext,
    ) -> Option<Outcome> {
        let manager = self.manager()?;
        manager.redeliver(subscriber, event, data, context).await
    }
}

impl fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BusHandle")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

/// Handle returned by `subscribe`; removes the subscriber once.
pub struct Unsubscribe {
    bus: BusHandle,
    event: Arc<str>,
    id: SubscriberId,
    done: AtomicBool,
}

impl Unsubscribe {
    /// Id of the subscriber this handle removes.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Removes the subscriber. Returns `false` on every call after the first.
    pub fn unsubscribe(&self) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.bus
            .manager()
            .is_some_and(|m| m.unsubscribe(&self.event, self.id))
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("event", &self.event)
            .field("id", &self.id)
            .field("done", &self.done.load(Ordering::Relaxed))
            .finish()
    }
}

/// Per-context subscriber registry and dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct SubscriberManager {
    inner: Arc<Inner>,
}

impl SubscriberManager {
    /// Starts building a manager.
    pub fn builder(config: &BusConfig) -> ManagerBuilder {
        ManagerBuilder::new(config)
    }

    /// Weak handle for middleware and timers.
    pub fn handle(&self) -> BusHandle {
        BusHandle(Arc::downgrade(&self.inner))
    }

    /// Diagnostics bus this manager publishes on.
    pub fn diagnostics(&self) -> &DiagnosticBus {
        &self.inner.diagnostics
    }

    /// Registers a subscriber for `event_type` (or [`WILDCARD`]).
    pub async fn subscribe(
        &self,
        event_type: &str,
        handler: HandlerRef,
        options: SubscriberOptions,
    ) -> Result<Unsubscribe, BusError> {
        if self.is_destroyed() {
            return Err(BusError::Destroyed);
        }
        let event: Arc<str> = Arc::from(event_type);
        let id = SubscriberId(self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed));
        let middlewares = self.inner.middlewares.read().clone();
        let sub = Arc::new(Subscriber::new(
            id,
            Arc::clone(&event),
            handler,
            options,
            middlewares,
        ));

        self.inner
            .subscribers
            .write()
            .entry(Arc::clone(&event))
            .or_default()
            .push(Arc::clone(&sub));

        let mut ctx = EventContext::new(
            Arc::clone(&sub),
            Arc::clone(&event),
            Value::Null,
            EmitContext {
                subscription: true,
                ..EmitContext::default()
            },
            self.next_emit_id(),
            self.handle(),
        );
        for mw in sub.middlewares() {
            if mw.delivers() {
                continue;
            }
            let _ = mw.process(&mut ctx).await;
        }

        tracing::debug!(event = %event, subscriber = %id, "subscriber added");
        self.inner.diagnostics.publish(
            Diagnostic::new(DiagnosticKind::SubscriberAdded)
                .with_subscriber(id.to_string())
                .with_event(Arc::clone(&event)),
        );

        Ok(Unsubscribe {
            bus: self.handle(),
            event,
            id,
            done: AtomicBool::new(false),
        })
    }

    /// Removes one subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, event_type: &str, id: SubscriberId) -> bool {
        let removed = {
            let mut subs = self.inner.subscribers.write();
            let Some(list) = subs.get_mut(event_type) else {
                return false;
            };
            let Some(pos) = list.iter().position(|s| s.id() == id) else {
                return false;
            };
            let sub = list.remove(pos);
            if list.is_empty() {
                subs.remove(event_type);
            }
            sub
        };
        removed.with_status(|s| s.state = SubscriberState::Destroyed);

        tracing::debug!(event = %event_type, subscriber = %id, "subscriber removed");
        self.inner.diagnostics.publish(
            Diagnostic::new(DiagnosticKind::SubscriberRemoved)
                .with_subscriber(id.to_string())
                .with_event(event_type),
        );
        true
    }

    /// Dispatches an emission to every matching subscriber.
    pub async fn emit(&self, event_type: &str, data: Value, context: EmitContext) -> EmitReport {
        let event: Arc<str> = Arc::from(event_type);
        let mut report = EmitReport::new(Arc::clone(&event));
        if self.is_destroyed() {
            return report;
        }
        let emit_id = self.next_emit_id();
        self.record_emission(&event);

        let handle = self.handle();
        for sub in self.matching(&event) {
            let mut ctx = EventContext::new(
                Arc::clone(&sub),
                Arc::clone(&event),
                data.clone(),
                context.clone(),
                emit_id,
                handle.clone(),
            );
            let outcome = run_chain(&mut ctx).await;
            report.push(sub.id(), outcome);
        }

        let emission = Emission {
            event,
            data,
            context,
            emit_id,
            bus: handle,
        };
        let middlewares = self.inner.middlewares.read().clone();
        for mw in middlewares {
            mw.post_process(&emission, &report).await;
        }

        tracing::trace!(
            event = %report.event_type,
            subscribers = report.subscriber_count,
            delivered = report.success_count,
            failed = report.failure_count,
            "emission done"
        );
        report
    }

    /// Runs one subscriber's chain outside a regular emission (debounce replays).
    pub async fn redeliver(
        &self,
        id: SubscriberId,
        event_type: &str,
        data: Value,
        context: EmitContext,
    ) -> Option<Outcome> {
        if self.is_destroyed() {
            return None;
        }
        let sub = self.find(id)?;
        if sub.state() == SubscriberState::Destroyed {
            return None;
        }
        let mut ctx = EventContext::new(
            sub,
            Arc::from(event_type),
            data,
            context,
            self.next_emit_id(),
            self.handle(),
        );
        Some(run_chain(&mut ctx).await)
    }

    /// Appends a middleware to the global list and to every existing subscriber.
    pub fn add_middleware(&self, mw: MiddlewareRef) {
        {
            let mut list = self.inner.middlewares.write();
            let at = list.partition_point(|m| m.priority() <= mw.priority());
            list.insert(at, Arc::clone(&mw));
        }
        for sub in self.all_subscribers() {
            sub.attach(Arc::clone(&mw));
        }
    }

    /// Names of the registered middleware in execution order.
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.inner
            .middlewares
            .read()
            .iter()
            .map(|m| m.name())
            .collect()
    }

    /// Looks up a subscriber.
    pub fn subscriber(&self, event_type: &str, id: SubscriberId) -> Option<Arc<Subscriber>> {
        self.inner
            .subscribers
            .read()
            .get(event_type)?
            .iter()
            .find(|s| s.id() == id)
            .cloned()
    }

    /// Applies a state or preference update. Returns `false` if the subscriber is unknown.
    pub fn update_subscriber(&self, event_type: &str, id: SubscriberId, update: SubscriberUpdate) -> bool {
        let Some(sub) = self.subscriber(event_type, id) else {
            return false;
        };
        if let Some(state) = update.state {
            if state == SubscriberState::Destroyed {
                return self.unsubscribe(event_type, id);
            }
            sub.set_state(state);
        }
        sub.with_options(|o| {
            if let Some(p) = update.priority {
                o.priority = p;
            }
            if let Some(n) = update.max_retries {
                o.max_retries = Some(n);
            }
            if let Some(f) = update.fallback {
                o.fallback = f;
            }
            if let Some(r) = update.rate_limit {
                o.rate_limit = r;
            }
            if let Some(d) = update.debounce {
                o.debounce = d;
            }
        });
        true
    }

    /// Subscriber population summary.
    pub fn subscriber_stats(&self) -> SubscriberStats {
        let mut stats = SubscriberStats::default();
        for sub in self.all_subscribers() {
            let status = sub.status();
            stats.total += 1;
            *stats.by_state.entry(status.state.as_label()).or_default() += 1;
            *stats.by_event.entry(sub.event_type().to_owned()).or_default() += 1;
            if status.quarantined {
                stats.quarantined += 1;
            }
            stats.executions += status.execution_count;
        }
        stats
    }

    /// Emission counters per event type.
    pub fn event_stats(&self) -> HashMap<String, EventStats> {
        self.inner
            .events
            .lock()
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Number of subscribers for `event_type` (wildcards not included).
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.inner
            .subscribers
            .read()
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Removes subscribers that saw no dispatch for longer than `max_idle`.
    pub fn sweep_inactive(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let idle: Vec<(Arc<str>, SubscriberId)> = self
            .all_subscribers()
            .into_iter()
            .filter(|s| now.saturating_duration_since(s.status().last_active) > max_idle)
            .map(|s| (s.event_type_arc(), s.id()))
            .collect();
        idle.into_iter()
            .filter(|(event, id)| self.unsubscribe(event, *id))
            .count()
    }

    /// Destroys every subscriber; further `subscribe` calls fail.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<Arc<Subscriber>> = self
            .inner
            .subscribers
            .write()
            .drain()
            .flat_map(|(_, list)| list)
            .collect();
        for sub in &drained {
            sub.with_status(|s| s.state = SubscriberState::Destroyed);
        }
        tracing::debug!(subscribers = drained.len(), "subscriber manager destroyed");
    }

    /// True after [`SubscriberManager::destroy`].
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    fn next_emit_id(&self) -> u64 {
        self.inner.next_emit.fetch_add(1, Ordering::Relaxed)
    }

    fn record_emission(&self, event: &Arc<str>) {
        let now = Instant::now();
        self.inner
            .events
            .lock()
            .entry(Arc::clone(event))
            .and_modify(|s| {
                s.emitted += 1;
                s.last_emitted = now;
            })
            .or_insert(EventStats {
                emitted: 1,
                last_emitted: now,
            });
    }

    fn matching(&self, event: &str) -> Vec<Arc<Subscriber>> {
        let subs = self.inner.subscribers.read();
        let mut out: Vec<Arc<Subscriber>> = subs.get(event).into_iter().flatten().cloned().collect();
        if event != WILDCARD {
            out.extend(subs.get(WILDCARD).into_iter().flatten().cloned());
        }
        drop(subs);
        out.retain(|s| s.state() != SubscriberState::Destroyed);
        out.sort_by(|a, b| b.priority().cmp(&a.priority()).then(a.id().cmp(&b.id())));
        out
    }

    fn all_subscribers(&self) -> Vec<Arc<Subscriber>> {
        self.inner
            .subscribers
            .read()
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    fn find(&self, id: SubscriberId) -> Option<Arc<Subscriber>> {
        self.inner
            .subscribers
            .read()
            .values()
            .flatten()
            .find(|s| s.id() == id)
            .cloned()
    }
}

impl fmt::Debug for SubscriberManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberManager")
            .field("middlewares", &self.middleware_names())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Runs one subscriber's chain to completion.
async fn run_chain(ctx: &mut EventContext) -> Outcome {
    ctx.subscriber
        .with_status(|s| s.last_active = Instant::now());

    for mw in ctx.subscriber.middlewares() {
        match mw.process(ctx).await {
            Flow::Continue => {}
            Flow::Replace { data, context } => {
                ctx.data = data;
                if let Some(context) = context {
                    ctx.context = context;
                }
            }
            Flow::Block { reason } => {
                tracing::trace!(
                    event = %ctx.event,
                    subscriber = %ctx.subscriber.id(),
                    middleware = mw.name(),
                    %reason,
                    "delivery blocked"
                );
                return Outcome::Blocked {
                    middleware: mw.name(),
                    reason,
                };
            }
        }
    }

    match ctx.outcome.take() {
        Some(Ok(value)) => Outcome::Delivered(value),
        Some(Err(e)) => Outcome::Failed(e.to_string()),
        None => Outcome::Delivered(Value::Null),
    }
}

/// Builder for [`SubscriberManager`] with an explicit middleware list.
pub struct ManagerBuilder {
    config: BusConfig,
    middlewares: Vec<MiddlewareRef>,
    diagnostics: Option<DiagnosticBus>,
}

impl ManagerBuilder {
    /// Creates a builder without middleware.
    pub fn new(config: &BusConfig) -> Self {
        Self {
            config: config.clone(),
            middlewares: Vec::new(),
            diagnostics: None,
        }
    }

    /// Adds one middleware.
    pub fn middleware(mut self, mw: MiddlewareRef) -> Self {
        self.middlewares.push(mw);
        self
    }

    /// Adds several middleware in registration order.
    pub fn middlewares(mut self, mws: impl IntoIterator<Item = MiddlewareRef>) -> Self {
        self.middlewares.extend(mws);
        self
    }

    /// Publishes diagnostics on `bus` instead of a private one.
    pub fn diagnostics(mut self, bus: DiagnosticBus) -> Self {
        self.diagnostics = Some(bus);
        self
    }

    /// Builds the manager.
    ///
    /// When no middleware delivers, the default [`ErrorRecovery`] is appended.
    pub fn build(self) -> SubscriberManager {
        let diagnostics = self
            .diagnostics
            .unwrap_or_else(|| DiagnosticBus::new(self.config.diagnostics_capacity_clamped()));

        let mut middlewares = self.middlewares;
        if !middlewares.iter().any(|m| m.delivers()) {
            middlewares.push(Arc::new(ErrorRecovery::new(&self.config, diagnostics.clone())));
        }
        // Stable: ties keep registration order.
        middlewares.sort_by_key(|m| m.priority());

        SubscriberManager {
            inner: Arc::new(Inner {
                middlewares: RwLock::new(middlewares),
                subscribers: RwLock::new(HashMap::new()),
                events: Mutex::new(HashMap::new()),
                next_subscriber: AtomicU64::new(0),
                next_emit: AtomicU64::new(0),
                destroyed: AtomicBool::new(false),
                diagnostics,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::bus::{Delivery, HandlerFn};
    use crate::error::HandlerError;
    use crate::middleware::Middleware;

    fn recorder(log: Arc<Mutex<Vec<String>>>, tag: &'static str) -> HandlerRef {
        HandlerFn::arc(tag, move |_d: Delivery| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(tag.to_string());
                Ok::<_, HandlerError>(Value::from(tag))
            }
        })
    }

    fn bare_manager() -> SubscriberManager {
        SubscriberManager::builder(&BusConfig::default()).build()
    }

    #[tokio::test]
    async fn priority_order_is_descending() {
        let mgr = bare_manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (tag, p) in [("five", 5), ("one", 1), ("three", 3)] {
            mgr.subscribe(
                "tick",
                recorder(Arc::clone(&log), tag),
                SubscriberOptions::new().priority(p),
            )
            .await
            .unwrap();
        }
        let report = mgr.emit("tick", Value::Null, EmitContext::new()).await;
        assert_eq!(*log.lock(), vec!["five", "three", "one"]);
        assert_eq!(report.success_count, 3);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let mgr = bare_manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let unsub = mgr
            .subscribe("tick", recorder(log, "a"), SubscriberOptions::new())
            .await
            .unwrap();
        assert!(unsub.unsubscribe());
        assert!(!unsub.unsubscribe());
        assert_eq!(mgr.subscriber_count("tick"), 0);
    }

    #[tokio::test]
    async fn wildcard_receives_everything() {
        let mgr = bare_manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        mgr.subscribe(WILDCARD, recorder(Arc::clone(&log), "all"), SubscriberOptions::new())
            .await
            .unwrap();
        mgr.emit("a", Value::Null, EmitContext::new()).await;
        mgr.emit("b", Value::Null, EmitContext::new()).await;
        assert_eq!(log.lock().len(), 2);
    }

    struct Veto;

    #[async_trait]
    impl Middleware for Veto {
        fn name(&self) -> &'static str {
            "veto"
        }
        fn priority(&self) -> i32 {
            10
        }
        async fn process(&self, ctx: &mut EventContext) -> Flow {
            if ctx.subscriber.priority() < 0 {
                Flow::block("negative priority")
            } else {
                Flow::Continue
            }
        }
    }

    struct PostCounter(Arc<AtomicUsize>);

    #[async_trait]
    impl Middleware for PostCounter {
        fn name(&self) -> &'static str {
            "post-counter"
        }
        fn priority(&self) -> i32 {
            1000
        }
        async fn process(&self, _ctx: &mut EventContext) -> Flow {
            Flow::Continue
        }
        async fn post_process(&self, _emission: &Emission, _report: &EmitReport) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn block_stops_one_subscriber_only() {
        let posts = Arc::new(AtomicUsize::new(0));
        let mgr = SubscriberManager::builder(&BusConfig::default())
            .middleware(Arc::new(Veto))
            .middleware(Arc::new(PostCounter(Arc::clone(&posts))))
            .build();
        let log = Arc::new(Mutex::new(Vec::new()));
        mgr.subscribe("x", recorder(Arc::clone(&log), "ok"), SubscriberOptions::new())
            .await
            .unwrap();
        mgr.subscribe(
            "x",
            recorder(Arc::clone(&log), "vetoed"),
            SubscriberOptions::new().priority(-1),
        )
        .await
        .unwrap();

        let report = mgr.emit("x", Value::Null, EmitContext::new()).await;
        assert_eq!(*log.lock(), vec!["ok"]);
        assert_eq!(report.success_count, 1);
        assert_eq!(report.blocked_count, 1);
        assert_eq!(report.failure_count, 1);

        mgr.emit("nobody-listens", Value::Null, EmitContext::new()).await;
        assert_eq!(posts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn builder_appends_delivery() {
        let mgr = bare_manager();
        assert_eq!(mgr.middleware_names(), vec!["error-recovery"]);
    }

    #[tokio::test]
    async fn destroyed_manager_rejects_and_reports_empty() {
        let mgr = bare_manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        mgr.subscribe("x", recorder(Arc::clone(&log), "a"), SubscriberOptions::new())
            .await
            .unwrap();
        mgr.destroy();
        let err = mgr
            .subscribe("x", recorder(log, "b"), SubscriberOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err, BusError::Destroyed);
        let report = mgr.emit("x", Value::Null, EmitContext::new()).await;
        assert_eq!(report.subscriber_count, 0);
    }

    #[tokio::test]
    async fn paused_subscriber_can_be_updated() {
        let mgr = bare_manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        let unsub = mgr
            .subscribe("x", recorder(log, "a"), SubscriberOptions::new())
            .await
            .unwrap();
        assert!(mgr.update_subscriber(
            "x",
            unsub.id(),
            SubscriberUpdate::state(SubscriberState::Paused)
        ));
        let sub = mgr.subscriber("x", unsub.id()).unwrap();
        assert_eq!(sub.state(), SubscriberState::Paused);
        assert_eq!(mgr.subscriber_stats().by_state.get("paused"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_subscribers_are_swept() {
        let mgr = bare_manager();
        let log = Arc::new(Mutex::new(Vec::new()));
        mgr.subscribe("x", recorder(Arc::clone(&log), "a"), SubscriberOptions::new())
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        mgr.subscribe("y", recorder(log, "b"), SubscriberOptions::new())
            .await
            .unwrap();
        assert_eq!(mgr.sweep_inactive(Duration::from_secs(5)), 1);
        assert_eq!(mgr.subscriber_count("x"), 0);
        assert_eq!(mgr.subscriber_count("y"), 1);
    }

    #[tokio::test]
    async fn event_stats_count_emissions() {
        let mgr = bare_manager();
        mgr.emit("a", Value::Null, EmitContext::new()).await;
        mgr.emit("a", Value::Null, EmitContext::new()).await;
        assert_eq!(mgr.event_stats().get("a").map(|s| s.emitted), Some(2));
    }
}
