//! Handler invocation with retries, quarantine and fallback.
//!
//! ```text
//! attempt 1 ─fail─► sleep(backoff(0)) ─► attempt 2 ─fail─► ... ─► attempt max_retries+1
//!   success → failure_count = 0, outcome = Ok(value)
//!   exhausted (or fatal) → failure_count += 1
//!       failure_count ≥ threshold → quarantine for base × 2^min(n - threshold, cap)
//!       fallback: ignore → Ok(null) | fallback(h) → h(delivery) | log → Err(error)
//! ```
//!
//! Panics inside a handler are caught and treated as fatal errors.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::time::Instant;

use super::{priority, Flow, Middleware};
use crate::bus::{Delivery, EventContext, HandlerRef};
use crate::config::BusConfig;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
use crate::error::HandlerError;
use crate::policies::{BackoffPolicy, FallbackBehavior, QuarantinePolicy};
use crate::value::Value;

/// Delivery middleware.
pub struct ErrorRecovery {
    retry: BackoffPolicy,
    quarantine: QuarantinePolicy,
    default_max_retries: u32,
    diagnostics: DiagnosticBus,
}

impl ErrorRecovery {
    /// Creates the middleware from the retry and quarantine sections of `config`.
    pub fn new(config: &BusConfig, diagnostics: DiagnosticBus) -> Self {
        Self {
            retry: config.retry,
            quarantine: config.quarantine,
            default_max_retries: config.default_max_retries,
            diagnostics,
        }
    }

    async fn run_with_retries(&self, ctx: &EventContext, handler: &HandlerRef, max_retries: u32) -> Result<Value, HandlerError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match invoke(handler, ctx.delivery()).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt <= max_retries => {
                    let delay = self.retry.next(attempt - 1);
                    tracing::debug!(
                        event = %ctx.event,
                        subscriber = %ctx.subscriber.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "handler failed, retrying"
                    );
                    self.diagnostics.publish(
                        Diagnostic::new(DiagnosticKind::RetryScheduled)
                            .with_subscriber(ctx.subscriber.id().to_string())
                            .with_event(ctx.event.clone())
                            .with_attempt(attempt)
                            .with_delay(delay)
                            .with_reason(e.to_string()),
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn apply_fallback(
        &self,
        fallback: &FallbackBehavior,
        ctx: &EventContext,
        error: HandlerError,
    ) -> Result<Value, HandlerError> {
        match fallback {
            FallbackBehavior::Ignore => Ok(Value::Null),
            FallbackBehavior::Fallback(h) => invoke(h, ctx.delivery()).await,
            FallbackBehavior::Log => {
                tracing::error!(
                    event = %ctx.event,
                    subscriber = %ctx.subscriber.id(),
                    error = %error,
                    "delivery failed"
                );
                Err(error)
            }
        }
    }
}

/// Runs one handler call, turning a panic into a fatal error.
async fn invoke(handler: &HandlerRef, delivery: Delivery) -> Result<Value, HandlerError> {
    match AssertUnwindSafe(handler.call(delivery)).catch_unwind().await {
        Ok(res) => res,
        Err(panic) => {
            let msg = if let Some(s) = panic.downcast_ref::<&'static str>() {
                (*s).to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(HandlerError::fatal(format!("handler panicked: {msg}")))
        }
    }
}

#[async_trait]
impl Middleware for ErrorRecovery {
    fn name(&self) -> &'static str {
        "error-recovery"
    }

    fn priority(&self) -> i32 {
        priority::DELIVERY
    }

    fn delivers(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() {
            return Flow::Continue;
        }
        let opts = ctx.subscriber.options();
        let handler = ctx.subscriber.handler().clone();
        let result = self
            .run_with_retries(ctx, &handler, opts.retries_or(self.default_max_retries))
            .await;

        let now = Instant::now();
        let id = ctx.subscriber.id();
        ctx.subscriber.with_status(|s| {
            s.execution_count += 1;
            s.last_executed = Some(now);
        });

        let error = match result {
            Ok(v) => {
                ctx.subscriber.with_status(|s| s.failure_count = 0);
                ctx.outcome = Some(Ok(v));
                return Flow::Continue;
            }
            Err(e) => e,
        };

        let (failures, suspension) = ctx.subscriber.with_status(|s| {
            s.failure_count += 1;
            let suspension = self.quarantine.suspension(s.failure_count);
            if let Some(d) = suspension {
                s.quarantined = true;
                s.quarantine_until = Some(now + d);
            }
            (s.failure_count, suspension)
        });

        self.diagnostics.publish(
            Diagnostic::new(DiagnosticKind::DeliveryFailed)
                .with_subscriber(id.to_string())
                .with_event(ctx.event.clone())
                .with_reason(error.to_string())
                .with_count(u64::from(failures)),
        );
        if let Some(d) = suspension {
            tracing::warn!(
                event = %ctx.event,
                subscriber = %id,
                failures,
                suspended_ms = d.as_millis() as u64,
                "subscriber quarantined"
            );
            self.diagnostics.publish(
                Diagnostic::new(DiagnosticKind::SubscriberQuarantined)
                    .with_subscriber(id.to_string())
                    .with_event(ctx.event.clone())
                    .with_delay(d)
                    .with_count(u64::from(failures)),
            );
        }

        let outcome = self.apply_fallback(&opts.fallback, ctx, error).await;
        ctx.outcome = Some(outcome);
        Flow::Continue
    }
}
