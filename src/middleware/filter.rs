use async_trait::async_trait;

use super::{priority, Flow, Middleware};
use crate::bus::EventContext;

/// Blocks deliveries whose event type matches none of the subscriber's patterns.
///
/// A subscriber without patterns accepts everything.
#[derive(Debug, Default)]
pub struct EventFilter;

impl EventFilter {
    /// Creates the middleware.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for EventFilter {
    fn name(&self) -> &'static str {
        "event-filter"
    }

    fn priority(&self) -> i32 {
        priority::FILTER
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() {
            return Flow::Continue;
        }
        let opts = ctx.subscriber.options();
        if opts.event_patterns.is_empty() || opts.event_patterns.iter().any(|p| p.matches(&ctx.event)) {
            Flow::Continue
        } else {
            Flow::block("event filtered")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bus::{Delivery, EmitContext, HandlerFn, SubscriberManager, SubscriberOptions, WILDCARD};
    use crate::config::BusConfig;
    use crate::error::HandlerError;
    use crate::value::Value;

    #[tokio::test]
    async fn wildcard_subscriber_with_patterns() {
        let mgr = SubscriberManager::builder(&BusConfig::default())
            .middleware(Arc::new(EventFilter::new()))
            .build();
        let h = HandlerFn::arc("users", |_d: Delivery| async { Ok::<_, HandlerError>(Value::Null) });
        let opts = SubscriberOptions::new()
            .pattern("user:")
            .regex_pattern("^admin-")
            .unwrap();
        mgr.subscribe(WILDCARD, h, opts).await.unwrap();

        for (event, delivered) in [("user:login", 1), ("admin-reset", 1), ("page:view", 0)] {
            let report = mgr.emit(event, Value::Null, EmitContext::new()).await;
            assert_eq!(report.success_count, delivered, "{event}");
        }
    }
}
