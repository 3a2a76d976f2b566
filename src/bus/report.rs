//! # Emission results.
//!
//! [`EmitReport`] aggregates what happened to one `emit()` call across all
//! matching subscribers. It is returned to the emitter and handed to every
//! middleware's `post_process`.

use std::sync::Arc;

use crate::bus::context::EmitContext;
use crate::bus::manager::BusHandle;
use crate::bus::subscriber::SubscriberId;
use crate::value::Value;

/// What happened to one subscriber.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The handler (or a fallback) produced a value.
    Delivered(Value),
    /// A middleware vetoed the delivery.
    Blocked {
        /// Middleware name.
        middleware: &'static str,
        /// Veto reason.
        reason: String,
    },
    /// The handler kept failing and the fallback reported the error.
    Failed(String),
}

impl Outcome {
    /// True for [`Outcome::Delivered`].
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered(_))
    }
}

/// Per-subscriber response.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscriberResponse {
    /// Subscriber id.
    pub subscriber: SubscriberId,
    /// Outcome.
    pub outcome: Outcome,
}

/// Aggregate result of one `emit()`.
#[derive(Clone, Debug, PartialEq)]
pub struct EmitReport {
    /// Event type.
    pub event_type: Arc<str>,
    /// Subscribers the emission was dispatched to.
    pub subscriber_count: usize,
    /// Delivered responses.
    pub success_count: usize,
    /// Blocked or failed responses.
    pub failure_count: usize,
    /// Of `failure_count`, how many were middleware vetoes.
    pub blocked_count: usize,
    /// Responses in dispatch order.
    pub responses: Vec<SubscriberResponse>,
}

impl EmitReport {
    pub(crate) fn new(event_type: Arc<str>) -> Self {
        Self {
            event_type,
            subscriber_count: 0,
            success_count: 0,
            failure_count: 0,
            blocked_count: 0,
            responses: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, subscriber: SubscriberId, outcome: Outcome) {
        self.subscriber_count += 1;
        match &outcome {
            Outcome::Delivered(_) => self.success_count += 1,
            Outcome::Blocked { .. } => {
                self.failure_count += 1;
                self.blocked_count += 1;
            }
            Outcome::Failed(_) => self.failure_count += 1,
        }
        self.responses.push(SubscriberResponse {
            subscriber,
            outcome,
        });
    }

    /// Values produced by delivered responses, in dispatch order.
    pub fn delivered(&self) -> impl Iterator<Item = &Value> {
        self.responses.iter().filter_map(|r| match &r.outcome {
            Outcome::Delivered(v) => Some(v),
            _ => None,
        })
    }
}

/// The emission as seen by `post_process`.
#[derive(Clone, Debug)]
pub struct Emission {
    /// Event type.
    pub event: Arc<str>,
    /// Payload as passed to `emit()`.
    pub data: Value,
    /// Context as passed to `emit()`.
    pub context: EmitContext,
    /// Per-manager emission sequence number.
    pub emit_id: u64,
    pub(crate) bus: BusHandle,
}

impl Emission {
    /// Handle to the manager that performed the emission.
    pub fn bus(&self) -> &BusHandle {
        &self.bus
    }
}
