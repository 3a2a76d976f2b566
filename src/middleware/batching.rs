//! Coalescing windows.
//!
//! Emissions whose event type matches a rule are held back and replayed once,
//! `delay` after the last emission of the burst:
//!
//! ```text
//! Replace     → the last payload wins
//! Accumulate  → every payload, replayed one emission each, in order
//! Merge       → shallow merge of object payloads, later keys win
//! ```
//!
//! Replays are regular `emit()` calls with `context.batched = true`, which every
//! rule lets through. Emissions flagged `batchable` are queued like any other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::{priority, Flow, Middleware};
use crate::bus::{EmitContext, EmitReport, Emission, EventContext};
use crate::error::BusError;
use crate::value::Value;

/// How queued payloads are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatchStrategy {
    /// Keep the last payload.
    Replace,
    /// Replay every payload, each as its own emission.
    Accumulate,
    /// Shallow-merge object payloads.
    Merge,
}

impl BatchStrategy {
    fn as_label(&self) -> &'static str {
        match self {
            BatchStrategy::Replace => "replace",
            BatchStrategy::Accumulate => "accumulate",
            BatchStrategy::Merge => "merge",
        }
    }
}

/// One batching rule.
#[derive(Clone, Debug)]
pub struct BatchRule {
    /// Event types the rule applies to.
    pub pattern: Regex,
    /// Combination strategy.
    pub strategy: BatchStrategy,
    /// Quiet time before the replay.
    pub delay: Duration,
}

struct Pending {
    payloads: Vec<Value>,
    context: EmitContext,
    generation: u64,
}

type Key = (Arc<str>, BatchStrategy);

/// Batching middleware.
pub struct Batching {
    rules: Vec<BatchRule>,
    default_delay: Duration,
    pending: Arc<Mutex<HashMap<Key, Pending>>>,
    token: CancellationToken,
}

impl Batching {
    /// Creates the middleware without rules; timers stop when `token` is cancelled.
    pub fn new(token: CancellationToken, default_delay: Duration) -> Self {
        Self {
            rules: Vec::new(),
            default_delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            token,
        }
    }

    /// Adds a rule; `delay = None` uses the default window.
    pub fn rule(
        mut self,
        pattern: &str,
        strategy: BatchStrategy,
        delay: Option<Duration>,
    ) -> Result<Self, BusError> {
        let re = Regex::new(pattern).map_err(|e| BusError::InvalidPattern {
            pattern: pattern.to_owned(),
            error: e.to_string(),
        })?;
        self.rules.push(BatchRule {
            pattern: re,
            strategy,
            delay: delay.unwrap_or(self.default_delay),
        });
        Ok(self)
    }

    /// Number of batches waiting for their window to close.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn rule_for(&self, event: &str) -> Option<&BatchRule> {
        self.rules.iter().find(|r| r.pattern.is_match(event))
    }

    fn enqueue(&self, emission: &Emission, rule: &BatchRule) {
        let key: Key = (Arc::clone(&emission.event), rule.strategy);
        let generation = {
            let mut pending = self.pending.lock();
            let slot = pending.entry(key.clone()).or_insert_with(|| Pending {
                payloads: Vec::new(),
                context: EmitContext::default(),
                generation: 0,
            });
            match rule.strategy {
                BatchStrategy::Replace => {
                    slot.payloads.clear();
                    slot.payloads.push(emission.data.clone());
                }
                BatchStrategy::Accumulate | BatchStrategy::Merge => {
                    slot.payloads.push(emission.data.clone());
                }
            }
            slot.context = emission.context.clone();
            slot.generation += 1;
            slot.generation
        };

        let pending = Arc::clone(&self.pending);
        let token = self.token.clone();
        let bus = emission.bus().clone();
        let delay = rule.delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let ready = {
                        let mut pending = pending.lock();
                        match pending.get(&key) {
                            Some(p) if p.generation == generation => pending.remove(&key),
                            _ => None,
                        }
                    };
                    let Some(batch) = ready else { return };
                    let (event, strategy) = key;
                    let count = batch.payloads.len();
                    let mut context = batch.context;
                    context.batched = true;
                    tracing::trace!(
                        event = %event,
                        strategy = strategy.as_label(),
                        count,
                        "flushing batch"
                    );
                    for data in combine(strategy, batch.payloads) {
                        if bus.emit(&event, data, context.clone()).await.is_none() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

/// Payloads to replay for one closed window.
fn combine(strategy: BatchStrategy, mut payloads: Vec<Value>) -> Vec<Value> {
    match strategy {
        BatchStrategy::Replace => payloads.pop().into_iter().collect(),
        BatchStrategy::Accumulate => payloads,
        BatchStrategy::Merge => {
            let mut merged = Value::object();
            for p in payloads {
                match p {
                    Value::Object(map) => {
                        for (k, v) in map {
                            merged.insert(k, v);
                        }
                    }
                    // Non-object payloads replace whatever was merged so far.
                    other => merged = other,
                }
            }
            vec![merged]
        }
    }
}

#[async_trait]
impl Middleware for Batching {
    fn name(&self) -> &'static str {
        "batching"
    }

    fn priority(&self) -> i32 {
        priority::BATCHING
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() || ctx.context.batched {
            return Flow::Continue;
        }
        if self.rule_for(&ctx.event).is_some() {
            Flow::block("batched")
        } else {
            Flow::Continue
        }
    }

    async fn post_process(&self, emission: &Emission, _report: &EmitReport) {
        if emission.context.batched || emission.context.subscription {
            return;
        }
        if let Some(rule) = self.rule_for(&emission.event) {
            self.enqueue(emission, rule);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bus::{Delivery, HandlerFn, SubscriberManager, SubscriberOptions};
    use crate::config::BusConfig;
    use crate::error::HandlerError;

    async fn setup(strategy: BatchStrategy) -> (SubscriberManager, Arc<Mutex<Vec<Value>>>) {
        let batching = Batching::new(CancellationToken::new(), Duration::from_millis(150))
            .rule("^scroll$", strategy, None)
            .unwrap();
        let mgr = SubscriberManager::builder(&BusConfig::default())
            .middleware(Arc::new(batching))
            .build();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let h = HandlerFn::arc("sink", move |d: Delivery| {
            sink.lock().push(d.data);
            async { Ok::<_, HandlerError>(Value::Null) }
        });
        mgr.subscribe("scroll", h, SubscriberOptions::new())
            .await
            .unwrap();
        (mgr, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn replace_delivers_last_payload_once() {
        let (mgr, seen) = setup(BatchStrategy::Replace).await;
        for y in 0..5 {
            let report = mgr
                .emit("scroll", Value::from(json!({"y": y})), EmitContext::new())
                .await;
            assert_eq!(report.blocked_count, 1);
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        assert!(seen.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), vec![Value::from(json!({"y": 4}))]);
    }

    #[tokio::test(start_paused = true)]
    async fn accumulate_replays_each_payload() {
        let (mgr, seen) = setup(BatchStrategy::Accumulate).await;
        mgr.emit("scroll", Value::from(json!({"a": 1})), EmitContext::new()).await;
        mgr.emit("scroll", Value::from(json!({"a": 2})), EmitContext::new()).await;
        mgr.emit("scroll", Value::from(json!({"a": 3})), EmitContext::new()).await;
        assert!(seen.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            *seen.lock(),
            vec![
                Value::from(json!({"a": 1})),
                Value::from(json!({"a": 2})),
                Value::from(json!({"a": 3})),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn merge_folds_objects() {
        let (mgr, seen) = setup(BatchStrategy::Merge).await;
        mgr.emit("scroll", Value::from(json!({"a": 1, "b": 1})), EmitContext::new()).await;
        mgr.emit("scroll", Value::from(json!({"b": 2})), EmitContext::new()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), vec![Value::from(json!({"a": 1, "b": 2}))]);

        let merged = combine(
            BatchStrategy::Merge,
            vec![
                Value::from(json!({"a": 1, "b": 1})),
                Value::from(json!({"b": 2})),
            ],
        );
        assert_eq!(merged, vec![Value::from(json!({"a": 1, "b": 2}))]);
    }
}
