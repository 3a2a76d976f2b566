//! Per-dispatch state flowing through one subscriber's middleware chain.

use std::sync::Arc;

use tokio::time::Instant;
use uuid::Uuid;

use crate::bus::context::EmitContext;
use crate::bus::handler::Delivery;
use crate::bus::manager::BusHandle;
use crate::bus::subscriber::Subscriber;
use crate::error::HandlerError;
use crate::value::Value;

/// One dispatch of one emission to one subscriber.
///
/// Middleware may rewrite `data` and `context` (or return
/// [`Flow::Replace`](crate::Flow::Replace)); the delivery middleware stores the
/// handler result in `outcome`.
pub struct EventContext {
    /// Target subscriber.
    pub subscriber: Arc<Subscriber>,
    /// Event type.
    pub event: Arc<str>,
    /// Payload.
    pub data: Value,
    /// Context bag.
    pub context: EmitContext,
    /// Dispatch start.
    pub timestamp: Instant,
    /// Unique id of this dispatch.
    pub execution_id: Uuid,
    /// Sequence number shared by every dispatch of the same `emit()`.
    pub emit_id: u64,
    /// Handler result, set by the delivery middleware.
    pub outcome: Option<Result<Value, HandlerError>>,
    pub(crate) bus: BusHandle,
}

impl EventContext {
    pub(crate) fn new(
        subscriber: Arc<Subscriber>,
        event: Arc<str>,
        data: Value,
        context: EmitContext,
        emit_id: u64,
        bus: BusHandle,
    ) -> Self {
        Self {
            subscriber,
            event,
            data,
            context,
            timestamp: Instant::now(),
            execution_id: Uuid::new_v4(),
            emit_id,
            outcome: None,
            bus,
        }
    }

    /// True for the synthetic dispatch run once when a subscriber is registered.
    pub fn is_subscription(&self) -> bool {
        self.context.subscription
    }

    /// Handle to the owning manager, for middleware that re-emit later.
    pub fn bus(&self) -> &BusHandle {
        &self.bus
    }

    /// Builds what the handler receives.
    pub fn delivery(&self) -> Delivery {
        Delivery {
            event: Arc::clone(&self.event),
            data: self.data.clone(),
            context: self.context.clone(),
            subscriber: self.subscriber.id(),
        }
    }
}
