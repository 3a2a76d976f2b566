use async_trait::async_trait;
use tokio::time::Instant;

use super::{priority, Flow, Middleware};
use crate::bus::{EventContext, SubscriberState};
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};

/// Blocks inactive and quarantined subscribers.
///
/// An expired quarantine is lifted here, on the first dispatch after
/// `quarantine_until`, which also resets the failure count.
pub struct StateValidation {
    diagnostics: DiagnosticBus,
}

impl StateValidation {
    /// Creates the middleware.
    pub fn new(diagnostics: DiagnosticBus) -> Self {
        Self { diagnostics }
    }
}

enum Verdict {
    Pass,
    Cleared,
    Block(String),
}

#[async_trait]
impl Middleware for StateValidation {
    fn name(&self) -> &'static str {
        "state-validation"
    }

    fn priority(&self) -> i32 {
        priority::VALIDATION
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() {
            return Flow::Continue;
        }
        let now = Instant::now();
        let verdict = ctx.subscriber.with_status(|s| {
            if s.state != SubscriberState::Active {
                return Verdict::Block(format!("subscriber is {}", s.state.as_label()));
            }
            if !s.quarantined {
                return Verdict::Pass;
            }
            match s.quarantine_until {
                Some(until) if now < until => Verdict::Block("subscriber is quarantined".into()),
                _ => {
                    s.quarantined = false;
                    s.quarantine_until = None;
                    s.failure_count = 0;
                    Verdict::Cleared
                }
            }
        });

        match verdict {
            Verdict::Pass => Flow::Continue,
            Verdict::Cleared => {
                let id = ctx.subscriber.id();
                tracing::info!(event = %ctx.event, subscriber = %id, "quarantine lifted");
                self.diagnostics.publish(
                    Diagnostic::new(DiagnosticKind::QuarantineCleared)
                        .with_subscriber(id.to_string())
                        .with_event(ctx.event.clone()),
                );
                Flow::Continue
            }
            Verdict::Block(reason) => Flow::Block { reason },
        }
    }
}
