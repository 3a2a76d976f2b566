//! # LogWriter: diagnostics through `tracing`
//!
//! A minimal observer that renders every [`Diagnostic`] as a structured
//! `tracing` record. Failures and drops are logged at `warn`, everything else
//! at `debug`.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::observers::Observe;

/// Diagnostic writer observer.
#[derive(Default, Debug, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Creates a new writer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_diagnostic(&self, d: &Diagnostic) {
        let subscriber = d.subscriber.as_deref().unwrap_or("-");
        let event = d.event.as_deref().unwrap_or("-");
        let context = d.context.as_deref().unwrap_or("-");
        let reason = d.reason.as_deref().unwrap_or("");

        match d.kind {
            DiagnosticKind::DeliveryFailed
            | DiagnosticKind::SubscriberQuarantined
            | DiagnosticKind::SlowEvents
            | DiagnosticKind::StormBlocked
            | DiagnosticKind::MessageDropped
            | DiagnosticKind::SerializationFailed
            | DiagnosticKind::ObserverPanicked
            | DiagnosticKind::ObserverOverflow => {
                warn!(
                    seq = d.seq,
                    kind = ?d.kind,
                    subscriber,
                    event,
                    context,
                    count = d.count,
                    delay_ms = d.delay_ms,
                    reason,
                    "relaybus diagnostic"
                );
            }
            _ => {
                debug!(
                    seq = d.seq,
                    kind = ?d.kind,
                    subscriber,
                    event,
                    context,
                    attempt = d.attempt,
                    reason,
                    "relaybus diagnostic"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
