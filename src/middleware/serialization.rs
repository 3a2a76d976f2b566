use std::sync::Arc;

use async_trait::async_trait;

use super::{priority, Flow, Middleware};
use crate::bus::EventContext;
use crate::codec::Codec;
use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
use crate::value::Value;

/// Replaces the payload by its codec envelope when it has to cross a context
/// boundary or holds values that are not plain JSON.
///
/// On failure the delivery continues with the original payload.
pub struct Serialization {
    codec: Arc<Codec>,
    diagnostics: DiagnosticBus,
}

impl Serialization {
    /// Creates the middleware.
    pub fn new(codec: Arc<Codec>, diagnostics: DiagnosticBus) -> Self {
        Self { codec, diagnostics }
    }
}

#[async_trait]
impl Middleware for Serialization {
    fn name(&self) -> &'static str {
        "serialization"
    }

    fn priority(&self) -> i32 {
        priority::SERIALIZATION
    }

    async fn process(&self, ctx: &mut EventContext) -> Flow {
        if ctx.is_subscription() || ctx.context.serialized {
            return Flow::Continue;
        }
        let engage = ctx.context.cross_context
            || ctx.subscriber.options().cross_context
            || ctx.data.is_complex();
        if !engage {
            return Flow::Continue;
        }

        match self.codec.serialize(&ctx.data) {
            Ok(json) => {
                let mut context = ctx.context.clone();
                context.serialized = true;
                Flow::Replace {
                    data: Value::from(json),
                    context: Some(context),
                }
            }
            Err(e) => {
                tracing::warn!(
                    event = %ctx.event,
                    subscriber = %ctx.subscriber.id(),
                    error = %e,
                    "payload serialization failed, delivering unserialized"
                );
                self.diagnostics.publish(
                    Diagnostic::new(DiagnosticKind::SerializationFailed)
                        .with_event(ctx.event.clone())
                        .with_reason(e.as_label()),
                );
                Flow::Continue
            }
        }
    }
}
