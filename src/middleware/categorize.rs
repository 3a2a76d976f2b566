use std::sync::Arc;

use async_trait::async_trait;

use super::{priority, Flow, Middleware};
use crate::bus::EventContext;
use crate::categories::{CategoryRegistry, ResolveContext, ResolveStrategy};
use crate::value::Value;

/// Resolves each delivery into categories and stamps the context bag.
///
/// Never blocks. The event type is tested alongside the payload's strings.
pub struct Categorize {
    registry: Arc<CategoryRegistry>,
    strategy: ResolveStrategy,
}

impl Categorize {
    /// Creates the middleware using the `specific` strategy.
    pub fn new(registry: Arc<CategoryRegistry>) -> Self {
        Self {
            registry,
            strategy: ResolveStrategy::Specific,
        }
    }

    /// Uses another resolution strategy.
    pub fn with_strategy(mut self, strategy: ResolveStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// The event type plus the payload, as one testable object.
fn testable(event: &str, data: &Value) -> Value {
    let mut out = match data {
        Value::Object(_) => data.clone(),
        Value::String(s) => {
            let mut obj = Value::object();
            obj.insert("message", s.as_str());
            obj
        }
        _ => Value::object(),
    };
    if out.get("event").is_none() {
        out.insert("event", event);
    }
    out
}

#[async_trait]
impl Middleware for Categorize {
    fn name(&self) -> &'static str {
        "categorize"
    }

    fn priority(&self) -> i32 {
        priority::CATEGORIZE
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() {
            return Flow::Continue;
        }
        let subject = testable(&ctx.event, &ctx.data);
        let res = self
            .registry
            .resolve(&subject, self.strategy, &ResolveContext::default())
            .await;
        if !res.matches.is_empty() {
            ctx.context.primary_category = res.primary_id().map(str::to_owned);
            ctx.context.categories = res.matches.into_iter().map(|m| m.id).collect();
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testable_keeps_payload_event() {
        let mut data = Value::object();
        data.insert("event", "inner");
        assert_eq!(testable("outer", &data).get("event"), Some(&Value::from("inner")));
        assert_eq!(
            testable("outer", &Value::from("hi")).get("message"),
            Some(&Value::from("hi"))
        );
    }
}
