//! Throttle and debounce.
//!
//! Rules are keyed by a regex over the event type. A subscriber's own
//! `rate_limit` / `debounce` preferences take precedence over the rules.
//!
//! ```text
//! throttle(d): pass, then drop re-fires for d
//! debounce(d): block every call; d after the last call of a burst,
//!              redeliver that call once (context.debounced = true)
//! ```
//!
//! State is kept per (subscriber, event). Slots whose throttle window closed
//! and that have no debounce in flight are swept every `sweep_interval`.
//! Emissions flagged `batchable`, and debounced replays, skip this middleware.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{priority, Flow, Middleware};
use crate::bus::{EventContext, SubscriberId};
use crate::error::BusError;

/// Rate limiting rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateRule {
    /// At most one delivery per interval.
    Throttle(Duration),
    /// One delivery after the given quiet time.
    Debounce(Duration),
}

type Key = (SubscriberId, Arc<str>);

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
struct Slot {
    throttled_until: Option<Instant>,
    generation: u64,
    debounce_pending: bool,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.debounce_pending || self.throttled_until.is_some_and(|t| now < t)
    }
}

struct Slots {
    map: HashMap<Key, Slot>,
    last_sweep: Instant,
}

impl Slots {
    fn sweep(&mut self, now: Instant, every: Duration) {
        if now.saturating_duration_since(self.last_sweep) < every {
            return;
        }
        self.map.retain(|_, slot| slot.is_live(now));
        self.last_sweep = now;
    }
}

/// Rate limiting middleware.
pub struct RateLimit {
    rules: Vec<(Regex, RateRule)>,
    slots: Arc<Mutex<Slots>>,
    sweep_interval: Duration,
    token: CancellationToken,
}

impl RateLimit {
    /// Creates the middleware without rules; debounce timers stop when `token` is cancelled.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            rules: Vec::new(),
            slots: Arc::new(Mutex::new(Slots {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            token,
        }
    }

    /// How often idle slots are dropped.
    pub fn sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_interval = every;
        self
    }

    /// Number of (subscriber, event) slots currently held.
    pub fn tracked(&self) -> usize {
        self.slots.lock().map.len()
    }

    /// Adds a rule for event types matching `pattern`.
    pub fn rule(mut self, pattern: &str, rule: RateRule) -> Result<Self, BusError> {
        let re = Regex::new(pattern).map_err(|e| BusError::InvalidPattern {
            pattern: pattern.to_owned(),
            error: e.to_string(),
        })?;
        self.rules.push((re, rule));
        Ok(self)
    }

    /// Shorthand for a throttle rule.
    pub fn throttle(self, pattern: &str, interval: Duration) -> Result<Self, BusError> {
        self.rule(pattern, RateRule::Throttle(interval))
    }

    /// Shorthand for a debounce rule.
    pub fn debounce(self, pattern: &str, quiet: Duration) -> Result<Self, BusError> {
        self.rule(pattern, RateRule::Debounce(quiet))
    }

    fn effective_rule(&self, ctx: &EventContext) -> Option<RateRule> {
        let opts = ctx.subscriber.options();
        if let Some(quiet) = opts.debounce {
            return Some(RateRule::Debounce(quiet));
        }
        if let Some(interval) = opts.rate_limit {
            return Some(RateRule::Throttle(interval));
        }
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(&ctx.event))
            .map(|(_, rule)| *rule)
    }

    fn throttle_pass(&self, key: Key, interval: Duration) -> bool {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        slots.sweep(now, self.sweep_interval);
        let slot = slots.map.entry(key).or_default();
        if slot.throttled_until.is_some_and(|t| now < t) {
            return false;
        }
        slot.throttled_until = Some(now + interval);
        true
    }

    fn schedule_debounce(&self, ctx: &EventContext, quiet: Duration) {
        let key: Key = (ctx.subscriber.id(), Arc::clone(&ctx.event));
        let generation = {
            let mut slots = self.slots.lock();
            slots.sweep(Instant::now(), self.sweep_interval);
            let slot = slots.map.entry(key.clone()).or_default();
            slot.generation += 1;
            slot.debounce_pending = true;
            slot.generation
        };

        let slots = Arc::clone(&self.slots);
        let token = self.token.clone();
        let bus = ctx.bus().clone();
        let data = ctx.data.clone();
        let mut context = ctx.context.clone();
        context.debounced = true;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(quiet) => {
                    let latest = {
                        let mut slots = slots.lock();
                        let latest = slots.map.get(&key).is_some_and(|s| s.generation == generation);
                        if latest {
                            slots.map.remove(&key);
                        }
                        latest
                    };
                    if latest {
                        let (id, event) = key;
                        tracing::trace!(event = %event, subscriber = %id, "debounced redelivery");
                        bus.redeliver(id, &event, data, context).await;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl Middleware for RateLimit {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    fn priority(&self) -> i32 {
        priority::RATE_LIMIT
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() || ctx.context.batchable || ctx.context.debounced {
            return Flow::Continue;
        }
        match self.effective_rule(ctx) {
            None => Flow::Continue,
            Some(RateRule::Throttle(interval)) => {
                let key = (ctx.subscriber.id(), Arc::clone(&ctx.event));
                if self.throttle_pass(key, interval) {
                    Flow::Continue
                } else {
                    Flow::block("throttled")
                }
            }
            Some(RateRule::Debounce(quiet)) => {
                self.schedule_debounce(ctx, quiet);
                Flow::block("debounced")
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
    use crate::config::BusConfig;
    use crate::error::HandlerError;
    use crate::value::Value;

    type Seen = Arc<Mutex<Vec<Value>>>;

    async fn setup(limit: RateLimit, opts: SubscriberOptions) -> (SubscriberManager, Seen) {
        let mgr = SubscriberManager::builder(&BusConfig::default())
            .middleware(Arc::new(limit))
            .build();
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let h = HandlerFn::arc("sink", move |d: Delivery| {
            sink.lock().push(d.data);
            async { Ok::<_, HandlerError>(Value::Null) }
        });
        mgr.subscribe("move", h, opts).await.unwrap();
        (mgr, seen)
    }

    fn payload(n: i64) -> Value {
        Value::from(json!({ "n": n }))
    }

    #[test]
    fn bad_rule_pattern_is_rejected() {
        let err = RateLimit::new(CancellationToken::new())
            .throttle("(", Duration::from_millis(10))
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "bus_invalid_pattern");
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_rule_passes_first_of_a_window() {
        let limit = RateLimit::new(CancellationToken::new())
            .throttle("^move$", Duration::from_millis(500))
            .unwrap();
        let (mgr, seen) = setup(limit, SubscriberOptions::new()).await;

        for n in 0..3 {
            mgr.emit("move", payload(n), EmitContext::new()).await;
            tokio::time::advance(Duration::from_millis(200)).await;
        }
        assert_eq!(*seen.lock(), vec![payload(0)]);

        mgr.emit("move", payload(3), EmitContext::new()).await;
        assert_eq!(*seen.lock(), vec![payload(0), payload(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_rule_delivers_last_of_burst() {
        let limit = RateLimit::new(CancellationToken::new())
            .debounce("^move$", Duration::from_millis(100))
            .unwrap();
        let (mgr, seen) = setup(limit, SubscriberOptions::new()).await;

        for n in 0..3 {
            let report = mgr.emit("move", payload(n), EmitContext::new()).await;
            assert_eq!(report.blocked_count, 1);
            tokio::time::advance(Duration::from_millis(20)).await;
        }
        assert!(seen.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), vec![payload(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn subscriber_preference_beats_rules() {
        let limit = RateLimit::new(CancellationToken::new())
            .debounce("^move$", Duration::from_secs(5))
            .unwrap();
        let opts = SubscriberOptions::new().rate_limit(Duration::from_secs(1));
        let (mgr, seen) = setup(limit, opts).await;

        mgr.emit("move", payload(0), EmitContext::new()).await;
        mgr.emit("move", payload(1), EmitContext::new()).await;
        assert_eq!(*seen.lock(), vec![payload(0)]);

        tokio::time::advance(Duration::from_secs(1)).await;
        mgr.emit("move", payload(2), EmitContext::new()).await;
        assert_eq!(*seen.lock(), vec![payload(0), payload(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn subscriber_debounce_preference() {
        let limit = RateLimit::new(CancellationToken::new());
        let opts = SubscriberOptions::new().debounce(Duration::from_millis(50));
        let (mgr, seen) = setup(limit, opts).await;

        mgr.emit("move", payload(1), EmitContext::new()).await;
        mgr.emit("move", payload(2), EmitContext::new()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*seen.lock(), vec![payload(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn batchable_emissions_are_not_limited() {
        let limit = RateLimit::new(CancellationToken::new())
            .throttle("^move$", Duration::from_secs(1))
            .unwrap();
        let (mgr, seen) = setup(limit, SubscriberOptions::new()).await;

        for n in 0..3 {
            mgr.emit("move", payload(n), EmitContext::new().batchable()).await;
        }
        assert_eq!(seen.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_throttle_slots_are_swept() {
        let limit = Arc::new(
            RateLimit::new(CancellationToken::new())
                .sweep_interval(Duration::from_secs(1))
                .throttle("^move$", Duration::from_millis(100))
                .unwrap(),
        );
        let mgr = SubscriberManager::builder(&BusConfig::default())
            .middleware(Arc::clone(&limit) as crate::middleware::MiddlewareRef)
            .build();
        let noop: crate::HandlerRef = HandlerFn::arc("noop", |_d: Delivery| async { Ok::<_, HandlerError>(Value::Null) });
        let first = mgr
            .subscribe("move", Arc::clone(&noop), SubscriberOptions::new())
            .await
            .unwrap();
        mgr.emit("move", payload(0), EmitContext::new()).await;
        assert_eq!(limit.tracked(), 1);
        assert!(first.unsubscribe());

        mgr.subscribe("move", noop, SubscriberOptions::new()).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        mgr.emit("move", payload(1), EmitContext::new()).await;
        assert_eq!(limit.tracked(), 1);
    }
}
