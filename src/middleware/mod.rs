//! # Middleware pipeline.
//!
//! Every subscriber runs the same ordered chain of [`Middleware`] before (and
//! including) its handler:
//!
//! ```text
//! emit(event, data)
//!   for each subscriber (priority desc):
//!     validation(100) → loop guard(150) → rate limit(200) → categorize(250)
//!       → filter(300) → transform(400) → serialization(500)
//!       → routing(600) → batching(650) → delivery(700) → metrics(900)
//!   then every middleware: post_process(emission, report)
//! ```
//!
//! [`PayloadValidation`] (120) is opt-in and slots in after validation.
//!
//! ## Rules
//! - Order is ascending [`Middleware::priority`], ties by registration order.
//! - [`Flow::Block`] stops the chain for that subscriber only.
//! - [`Flow::Replace`] rewrites data (and optionally context) for the rest of the chain.
//! - One instance per bus context, shared by `Arc` across all subscribers.
//! - When a subscriber registers, each middleware sees one dispatch with
//!   `context.subscription = true`; delivering middleware are skipped for it.

mod batching;
mod categorize;
mod filter;
mod loop_guard;
mod metrics;
mod payload;
mod rate_limit;
mod recovery;
mod serialization;
mod transform;
mod validation;

pub use batching::{BatchRule, BatchStrategy, Batching};
pub use categorize::Categorize;
pub use filter::EventFilter;
pub use loop_guard::LoopGuard;
pub use metrics::{EventMetrics, Metrics};
pub use payload::{ActionRule, FieldKind, PayloadValidation, ACTION_ATTR};
pub use rate_limit::{RateLimit, RateRule};
pub use recovery::ErrorRecovery;
pub use serialization::Serialization;
pub use transform::Transform;
pub use validation::StateValidation;

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::{EmitContext, EmitReport, Emission, EventContext};
use crate::value::Value;

/// Priority bands of the built-in middleware.
pub mod priority {
    /// Subscriber state and quarantine.
    pub const VALIDATION: i32 = 100;
    /// Payload shape checks (opt-in).
    pub const PAYLOAD: i32 = 120;
    /// Duplicate and storm suppression.
    pub const LOOP_GUARD: i32 = 150;
    /// Throttle and debounce.
    pub const RATE_LIMIT: i32 = 200;
    /// Category stamping.
    pub const CATEGORIZE: i32 = 250;
    /// Subscriber event filters.
    pub const FILTER: i32 = 300;
    /// Subscriber transformations.
    pub const TRANSFORM: i32 = 400;
    /// Payload envelopes.
    pub const SERIALIZATION: i32 = 500;
    /// Cross-context announcements and forwarding.
    pub const ROUTING: i32 = 600;
    /// Coalescing windows.
    pub const BATCHING: i32 = 650;
    /// Handler invocation with retries.
    pub const DELIVERY: i32 = 700;
    /// Duration and size accounting.
    pub const METRICS: i32 = 900;
}

/// Result of one middleware step.
#[derive(Clone, Debug, PartialEq)]
pub enum Flow {
    /// Pass the dispatch on unchanged.
    Continue,
    /// Rewrite the payload (and optionally the context bag) for the rest of the chain.
    Replace {
        /// New payload.
        data: Value,
        /// New context bag, if it changes.
        context: Option<EmitContext>,
    },
    /// Veto the delivery to this subscriber.
    Block {
        /// Why.
        reason: String,
    },
}

impl Flow {
    /// Shorthand for [`Flow::Block`].
    pub fn block(reason: impl Into<String>) -> Self {
        Flow::Block {
            reason: reason.into(),
        }
    }

    /// Shorthand for a data-only [`Flow::Replace`].
    pub fn replace(data: Value) -> Self {
        Flow::Replace {
            data,
            context: None,
        }
    }
}

/// One step of the pipeline.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Stable name, used in block reports and logs.
    fn name(&self) -> &'static str;

    /// Position in the chain (lower runs first).
    fn priority(&self) -> i32;

    /// True if this middleware invokes the handler.
    fn delivers(&self) -> bool {
        false
    }

    /// Processes one dispatch.
    async fn process(&self, ctx: &mut EventContext) -> Flow;

    /// Observes the aggregate result after all subscribers ran.
    async fn post_process(&self, _emission: &Emission, _report: &EmitReport) {}
}

/// Shared handle to a middleware.
pub type MiddlewareRef = Arc<dyn Middleware>;
