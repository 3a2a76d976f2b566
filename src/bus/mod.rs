//! # Subscribers and the subscriber manager.
//!
//! - [`SubscriberManager`] registers subscribers and dispatches emissions through the pipeline.
//! - [`Subscriber`] holds one handler, its preferences and its mutable status.
//! - [`EventContext`] is the per-dispatch state middleware operate on.
//! - [`EmitReport`] aggregates the outcome of one `emit()`.
//! - [`SubscriptionGroup`] releases a component's subscriptions together.

mod context;
mod event_context;
mod group;
mod handler;
mod manager;
mod options;
mod report;
mod subscriber;

pub use context::EmitContext;
pub use event_context::EventContext;
pub use group::SubscriptionGroup;
pub use handler::{BoxHandlerFuture, Delivery, Handler, HandlerFn, HandlerRef};
pub use manager::{
    BusHandle, EventStats, ManagerBuilder, SubscriberManager, SubscriberStats, Unsubscribe,
    WILDCARD,
};
pub use options::{EventPattern, SubscriberOptions, SubscriberUpdate, Transformation};
pub use report::{EmitReport, Emission, Outcome, SubscriberResponse};
pub use subscriber::{Subscriber, SubscriberId, SubscriberState, SubscriberStatus};
