//! Per-route delivery accounting.
//!
//! Runs after delivery. Each dispatch that reached the end of the chain is
//! recorded under `(event type, "source->local")`, where the source is the
//! originating context for routed emissions and the local context otherwise.
//!
//! A delivery slower than `slow_event` counts as slow. After
//! `slow_event_warn_after` slow deliveries of one event type a single warning
//! is logged and the counter starts over.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{priority, Flow, Middleware};
use crate::bus::EventContext;
use crate::config::BusConfig;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
use crate::routing::ContextId;

/// Counters for one (event, route) pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventMetrics {
    /// Dispatches recorded.
    pub count: u64,
    /// Dispatches whose handler succeeded.
    pub successes: u64,
    /// Dispatches whose handler failed.
    pub failures: u64,
    /// Sum of dispatch durations.
    pub total_duration: Duration,
    /// Slowest dispatch.
    pub max_duration: Duration,
    /// Sum of approximate payload sizes.
    pub total_bytes: u64,
}

impl EventMetrics {
    /// Mean dispatch duration, zero when nothing was recorded.
    pub fn mean_duration(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total_duration / self.count.min(u64::from(u32::MAX)) as u32
    }
}

type Key = (Arc<str>, String);

#[derive(Default)]
struct MetricsState {
    routes: HashMap<Key, EventMetrics>,
    slow: HashMap<Arc<str>, u32>,
}

/// Metrics middleware.
pub struct Metrics {
    local: ContextId,
    slow_event: Duration,
    warn_after: u32,
    state: Mutex<MetricsState>,
    diagnostics: DiagnosticBus,
}

impl Metrics {
    /// Creates the middleware for the context `local`.
    pub fn new(local: ContextId, config: &BusConfig, diagnostics: DiagnosticBus) -> Self {
        Self {
            local,
            slow_event: config.slow_event,
            warn_after: config.slow_event_warn_after,
            state: Mutex::new(MetricsState::default()),
            diagnostics,
        }
    }

    /// All counters, keyed by event type then route.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, EventMetrics>> {
        let st = self.state.lock();
        let mut out: BTreeMap<String, BTreeMap<String, EventMetrics>> = BTreeMap::new();
        for ((event, route), m) in &st.routes {
            out.entry(event.to_string())
                .or_default()
                .insert(route.clone(), m.clone());
        }
        out
    }

    /// Counters of one event type summed over every route.
    pub fn event(&self, event: &str) -> Option<EventMetrics> {
        let st = self.state.lock();
        let mut found = false;
        let mut sum = EventMetrics::default();
        for ((e, _), m) in &st.routes {
            if &**e != event {
                continue;
            }
            found = true;
            sum.count += m.count;
            sum.successes += m.successes;
            sum.failures += m.failures;
            sum.total_duration += m.total_duration;
            sum.max_duration = sum.max_duration.max(m.max_duration);
            sum.total_bytes += m.total_bytes;
        }
        found.then_some(sum)
    }

    fn route(&self, ctx: &EventContext) -> String {
        let source = ctx.context.source_context.as_ref().unwrap_or(&self.local);
        format!("{source}->{}", self.local)
    }
}

#[async_trait]
impl Middleware for Metrics {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn priority(&self) -> i32 {
        priority::METRICS
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() {
            return Flow::Continue;
        }
        let elapsed = Instant::now().saturating_duration_since(ctx.timestamp);
        let bytes = ctx.data.approx_size() as u64;
        let key: Key = (Arc::clone(&ctx.event), self.route(ctx));

        let warn = {
            let mut st = self.state.lock();
            let m = st.routes.entry(key).or_default();
            m.count += 1;
            match &ctx.outcome {
                Some(Err(_)) => m.failures += 1,
                _ => m.successes += 1,
            }
            m.total_duration += elapsed;
            m.max_duration = m.max_duration.max(elapsed);
            m.total_bytes += bytes;

            if elapsed > self.slow_event && self.warn_after > 0 {
                let slow = st.slow.entry(Arc::clone(&ctx.event)).or_default();
                *slow += 1;
                if *slow >= self.warn_after {
                    *slow = 0;
                    true
                } else {
                    false
                }
            } else {
                false
            }
        };

        if warn {
            tracing::warn!(
                event = %ctx.event,
                slow_after_ms = self.slow_event.as_millis() as u64,
                count = self.warn_after,
                "event is repeatedly slow"
            );
            self.diagnostics.publish(
                Diagnostic::new(DiagnosticKind::SlowEvents)
                    .with_event(ctx.event.clone())
                    .with_context(self.local.to_string())
                    .with_delay(self.slow_event)
                    .with_count(u64::from(self.warn_after)),
            );
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Delivery, EmitContext, HandlerFn, SubscriberManager, SubscriberOptions};
    use crate::error::HandlerError;
    use crate::value::Value;

    #[tokio::test(start_paused = true)]
    async fn slow_deliveries_warn_once_per_batch() {
        let config = BusConfig {
            slow_event_warn_after: 2,
            ..BusConfig::default()
        };
        let diagnostics = DiagnosticBus::new(16);
        let mut rx = diagnostics.subscribe();
        let metrics = Arc::new(Metrics::new(ContextId::from("local"), &config, diagnostics.clone()));
        let mgr = SubscriberManager::builder(&config)
            .diagnostics(diagnostics)
            .middleware(metrics.clone())
            .build();

        let slow = HandlerFn::arc("slow", |_d: Delivery| async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok::<_, HandlerError>(Value::Null)
        });
        mgr.subscribe("render", slow, SubscriberOptions::new())
            .await
            .unwrap();
        for _ in 0..3 {
            mgr.emit("render", Value::from("frame"), EmitContext::new()).await;
        }

        let m = metrics.event("render").unwrap();
        assert_eq!(m.count, 3);
        assert_eq!(m.successes, 3);
        assert!(m.max_duration >= Duration::from_millis(250));
        assert!(metrics.snapshot()["render"].contains_key("local->local"));

        let mut slow_warnings = 0;
        while let Ok(d) = rx.try_recv() {
            if d.kind == DiagnosticKind::SlowEvents {
                slow_warnings += 1;
            }
        }
        assert_eq!(slow_warnings, 1);
    }
}
