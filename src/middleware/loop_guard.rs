//! Duplicate and storm suppression.
//!
//! ```text
//! hash(event, payload without volatile keys)
//!   seen within duplicate_window by another emission → Block("duplicate")
//! fires of the event type within storm_window
//!   count > storm_threshold → Block("storm") until the window ends
//! ```
//!
//! Both checks are per emission: every subscriber of one `emit()` shares the
//! same verdict. Batched and debounced replays pass through, and emissions
//! flagged `batchable` skip storm control.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{priority, Flow, Middleware};
use crate::bus::EventContext;
use crate::config::BusConfig;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
use crate::value::Value;

/// Keys ignored when comparing payload shapes.
const VOLATILE_KEYS: [&str; 5] = ["timestamp", "executionId", "execution_id", "id", "at"];

/// Shared nodes nested deeper than this are not hashed further.
const MAX_HASH_DEPTH: usize = 32;

struct Seen {
    at: Instant,
    emit_id: u64,
}

struct Storm {
    window_start: Instant,
    count: u32,
    last_emit: u64,
    blocked: bool,
}

struct GuardState {
    seen: HashMap<u64, Seen>,
    storms: HashMap<Arc<str>, Storm>,
    last_sweep: Instant,
}

/// Loop-prevention middleware.
pub struct LoopGuard {
    duplicate_window: Duration,
    storm_threshold: u32,
    storm_window: Duration,
    sweep_interval: Duration,
    state: Mutex<GuardState>,
    diagnostics: DiagnosticBus,
}

impl LoopGuard {
    /// Creates the guard from the loop-prevention section of `config`.
    pub fn new(config: &BusConfig, diagnostics: DiagnosticBus) -> Self {
        Self {
            duplicate_window: config.duplicate_window,
            storm_threshold: config.storm_threshold,
            storm_window: config.storm_window,
            sweep_interval: config.sweep_interval,
            state: Mutex::new(GuardState {
                seen: HashMap::new(),
                storms: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            diagnostics,
        }
    }

    /// Number of remembered payload hashes.
    pub fn tracked(&self) -> usize {
        self.state.lock().seen.len()
    }

    fn sweep(&self, st: &mut GuardState, now: Instant) {
        if now.saturating_duration_since(st.last_sweep) < self.sweep_interval {
            return;
        }
        let dup = self.duplicate_window;
        let storm = self.storm_window;
        st.seen
            .retain(|_, s| now.saturating_duration_since(s.at) < dup);
        st.storms
            .retain(|_, s| now.saturating_duration_since(s.window_start) < storm);
        st.last_sweep = now;
    }

    /// Counts one emission of `event`; true while the event is storm-blocked.
    fn storm_check(&self, st: &mut GuardState, event: &Arc<str>, emit_id: u64, now: Instant) -> bool {
        let storm = st
            .storms
            .entry(Arc::clone(event))
            .or_insert_with(|| Storm {
                window_start: now,
                count: 0,
                last_emit: u64::MAX,
                blocked: false,
            });
        if storm.last_emit != emit_id {
            storm.last_emit = emit_id;
            if now.saturating_duration_since(storm.window_start) >= self.storm_window {
                storm.window_start = now;
                storm.count = 0;
                storm.blocked = false;
            }
            storm.count += 1;
            if storm.count > self.storm_threshold && !storm.blocked {
                storm.blocked = true;
                tracing::warn!(event = %event, fires = storm.count, "event storm detected");
                self.diagnostics.publish(
                    Diagnostic::new(DiagnosticKind::StormBlocked)
                        .with_event(Arc::clone(event))
                        .with_count(u64::from(storm.count)),
                );
            }
        }
        storm.blocked
    }
}

#[async_trait]
impl Middleware for LoopGuard {
    fn name(&self) -> &'static str {
        "loop-guard"
    }

    fn priority(&self) -> i32 {
        priority::LOOP_GUARD
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() || ctx.context.is_replay() {
            return Flow::Continue;
        }
        let now = Instant::now();
        let hash = shape_hash(&ctx.event, &ctx.data);
        let emit_id = ctx.emit_id;

        let mut st = self.state.lock();
        self.sweep(&mut st, now);

        if !ctx.context.batchable && self.storm_check(&mut st, &ctx.event, emit_id, now) {
            return Flow::block("event storm");
        }

        let duplicate = match st.seen.get(&hash) {
            Some(s) if s.emit_id == emit_id => return Flow::Continue,
            Some(s) => now.saturating_duration_since(s.at) < self.duplicate_window,
            None => false,
        };
        if duplicate {
            return Flow::block("duplicate emission");
        }
        st.seen.insert(hash, Seen { at: now, emit_id });
        Flow::Continue
    }
}

/// Hashes the event type and the payload shape, skipping volatile keys.
pub(crate) fn shape_hash(event: &str, data: &Value) -> u64 {
    let mut h = DefaultHasher::new();
    event.hash(&mut h);
    hash_value(data, &mut h, 0);
    h.finish()
}

fn hash_value(v: &Value, h: &mut DefaultHasher, depth: usize) {
    std::mem::discriminant(v).hash(h);
    match v {
        Value::Null => {}
        Value::Bool(b) => b.hash(h),
        Value::Number(n) => n.to_bits().hash(h),
        Value::String(s) => s.hash(h),
        Value::Array(items) | Value::Set(items) => {
            items.len().hash(h);
            for item in items {
                hash_value(item, h, depth);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                if VOLATILE_KEYS.contains(&k.as_str()) {
                    continue;
                }
                k.hash(h);
                hash_value(v, h, depth);
            }
        }
        Value::Map(entries) => {
            for (k, v) in entries {
                hash_value(k, h, depth);
                hash_value(v, h, depth);
            }
        }
        Value::Error(e) => {
            e.name.hash(h);
            e.message.hash(h);
        }
        Value::Function(f) => {
            f.name.hash(h);
            f.source.hash(h);
        }
        Value::Dom(d) => {
            d.tag_name.hash(h);
            d.id.hash(h);
            d.class_name.hash(h);
        }
        Value::Shared(node) => {
            if depth < MAX_HASH_DEPTH {
                node.with(|inner| hash_value(inner, h, depth + 1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::bus::{Delivery, EmitContext, HandlerFn, SubscriberManager, SubscriberOptions};
    use crate::error::HandlerError;

    async fn setup(diagnostics: DiagnosticBus) -> (SubscriberManager, Arc<Mutex<Vec<Value>>>) {
        let guard = LoopGuard::new(&BusConfig::default(), diagnostics);
        let mgr = SubscriberManager::builder(&BusConfig::default())
            .middleware(Arc::new(guard))
            .build();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let h = HandlerFn::arc("sink", move |d: Delivery| {
            sink.lock().push(d.data);
            async { Ok::<_, HandlerError>(Value::Null) }
        });
        mgr.subscribe("tick", h, SubscriberOptions::new()).await.unwrap();
        (mgr, seen)
    }

    #[test]
    fn volatile_keys_do_not_change_the_shape() {
        let a = Value::from(json!({"x": 1, "timestamp": 10, "id": "a"}));
        let b = Value::from(json!({"x": 1, "timestamp": 99, "id": "b"}));
        let c = Value::from(json!({"x": 2, "timestamp": 10}));
        assert_eq!(shape_hash("e", &a), shape_hash("e", &b));
        assert_ne!(shape_hash("e", &a), shape_hash("e", &c));
        assert_ne!(shape_hash("e", &a), shape_hash("f", &a));
    }

    #[tokio::test(start_paused = true)]
    async fn storm_blocks_fires_over_threshold_until_window_ends() {
        let diagnostics = DiagnosticBus::new(8);
        let mut rx = diagnostics.subscribe();
        let (mgr, seen) = setup(diagnostics).await;

        for n in 0..6 {
            mgr.emit("tick", Value::from(json!({"n": n})), EmitContext::new()).await;
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        assert_eq!(seen.lock().len(), 3);
        let diag = rx.try_recv().unwrap();
        assert_eq!(diag.kind, DiagnosticKind::StormBlocked);
        assert_eq!(diag.count, Some(4));
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        mgr.emit("tick", Value::from(json!({"n": 6})), EmitContext::new()).await;
        assert_eq!(seen.lock().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn batchable_bursts_skip_storm_control() {
        let (mgr, seen) = setup(DiagnosticBus::new(8)).await;
        for n in 0..6 {
            let ctx = EmitContext::new().batchable();
            mgr.emit("tick", Value::from(json!({"n": n})), ctx).await;
        }
        assert_eq!(seen.lock().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_payload_is_blocked_inside_the_window() {
        let (mgr, seen) = setup(DiagnosticBus::new(8)).await;
        let report = mgr.emit("tick", Value::from(json!({"n": 1})), EmitContext::new()).await;
        assert_eq!(report.success_count, 1);
        let report = mgr.emit("tick", Value::from(json!({"n": 1})), EmitContext::new()).await;
        assert_eq!(report.blocked_count, 1);

        tokio::time::advance(Duration::from_millis(150)).await;
        mgr.emit("tick", Value::from(json!({"n": 1})), EmitContext::new()).await;
        assert_eq!(seen.lock().len(), 2);
    }
}
