use async_trait::async_trait;

use super::{priority, Flow, Middleware};
use crate::bus::EventContext;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};

/// Runs the subscriber's transformations over payload and context, in order.
///
/// A failing transformation is logged and skipped; payload and context keep
/// what the previous step produced.
pub struct Transform {
    diagnostics: DiagnosticBus,
}

impl Transform {
    /// Creates the middleware.
    pub fn new(diagnostics: DiagnosticBus) -> Self {
        Self { diagnostics }
    }
}

#[async_trait]
impl Middleware for Transform {
    fn name(&self) -> &'static str {
        "transform"
    }

    fn priority(&self) -> i32 {
        priority::TRANSFORM
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() {
            return Flow::Continue;
        }
        let transformations = ctx.subscriber.options().transformations;
        for (i, f) in transformations.iter().enumerate() {
            let mut context = ctx.context.clone();
            match f(&ctx.data, &mut context) {
                Ok(data) => {
                    ctx.data = data;
                    ctx.context = context;
                }
                Err(error) => {
                    tracing::warn!(
                        event = %ctx.event,
                        subscriber = %ctx.subscriber.id(),
                        index = i,
                        %error,
                        "transformation failed"
                    );
                    self.diagnostics.publish(
                        Diagnostic::new(DiagnosticKind::TransformFailed)
                            .with_subscriber(ctx.subscriber.id().to_string())
                            .with_event(ctx.event.clone())
                            .with_reason(error),
                    );
                }
            }
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bus::{Delivery, EmitContext, HandlerFn, SubscriberManager, SubscriberOptions};
    use crate::config::BusConfig;
    use crate::error::HandlerError;
    use crate::value::Value;

    #[tokio::test]
    async fn failing_step_is_skipped() {
        let diagnostics = DiagnosticBus::new(8);
        let mut rx = diagnostics.subscribe();
        let mgr = SubscriberManager::builder(&BusConfig::default())
            .middleware(Arc::new(Transform::new(diagnostics)))
            .build();
        let echo = HandlerFn::arc("echo", |d: Delivery| async move { Ok::<_, HandlerError>(d.data) });
        let opts = SubscriberOptions::new()
            .transform(|v: &Value, _: &mut EmitContext| Ok(Value::from(v.as_f64().unwrap_or(0.0) + 1.0)))
            .transform(|_: &Value, _: &mut EmitContext| Err("nope".to_string()))
            .transform(|v: &Value, _: &mut EmitContext| Ok(Value::from(v.as_f64().unwrap_or(0.0) * 10.0)));
        mgr.subscribe("n", echo, opts).await.unwrap();

        let report = mgr.emit("n", Value::from(1), EmitContext::new()).await;
        assert_eq!(report.delivered().next(), Some(&Value::from(20.0)));
        assert_eq!(rx.try_recv().unwrap().kind, DiagnosticKind::SubscriberAdded);
        assert_eq!(rx.try_recv().unwrap().kind, DiagnosticKind::TransformFailed);
    }

    #[tokio::test]
    async fn context_edits_reach_the_handler() {
        let mgr = SubscriberManager::builder(&BusConfig::default())
            .middleware(Arc::new(Transform::new(DiagnosticBus::new(8))))
            .build();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let h = HandlerFn::arc("ctx", move |d: Delivery| {
            sink.lock().push(d.context.attrs.clone());
            async { Ok::<_, HandlerError>(Value::Null) }
        });
        let opts = SubscriberOptions::new()
            .transform(|v: &Value, ctx: &mut EmitContext| {
                ctx.attrs.insert("stage".into(), serde_json::json!("normalized"));
                Ok(v.clone())
            })
            .transform(|_: &Value, ctx: &mut EmitContext| {
                ctx.attrs.insert("stage".into(), serde_json::json!("discarded"));
                Err("rejected".to_string())
            });
        mgr.subscribe("n", h, opts).await.unwrap();

        mgr.emit("n", Value::from(1), EmitContext::new().attr("origin", serde_json::json!("test")))
            .await;
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("stage"), Some(&serde_json::json!("normalized")));
        assert_eq!(seen[0].get("origin"), Some(&serde_json::json!("test")));
    }
}
