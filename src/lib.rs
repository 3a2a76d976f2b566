//! # relaybus
//!
//! **relaybus** is a publish/subscribe bus for execution contexts that share no
//! memory and talk only through message passing (an orchestrator plus any
//! number of peers).
//!
//! Every context runs its own [`BusNode`]: subscribers register for event
//! types, emissions flow through an ordered middleware pipeline, and a router
//! forwards emissions to the contexts that announced interest in them.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌────────────────────────────┐          ┌────────────────────────────┐
//!   │ BusNode "A" (peer)         │          │ BusNode "bg" (orchestrator)│
//!   │                            │          │                            │
//!   │ SubscriberManager          │          │ SubscriberManager          │
//!   │  └─ per subscriber chain:  │          │                            │
//!   │     validation 100         │          │ Router                     │
//!   │     loop guard 150         │ announce │  - records remote interest │
//!   │     rate limit 200         ├─────────►│  - re-gossips to peers     │
//!   │     categorize 250         │          │  - relays routed events    │
//!   │     filter 300             │◄─────────┤                            │
//!   │     transform 400          │  routed  └─────────────┬──────────────┘
//!   │     serialization 500      │   event                │ fan-out
//!   │     router 600             │                        ▼
//!   │     batching 650           │          ┌────────────────────────────┐
//!   │     delivery 700           │          │ BusNode "B" (peer)         │
//!   │     metrics 900            │          └────────────────────────────┘
//!   │                            │
//!   │ CategoryRegistry  Codec    │
//!   │ DiagnosticBus ─► ObserverSet ─► LogWriter / custom observers
//!   └────────────────────────────┘
//! ```
//!
//! ### Emission
//! ```text
//! emit(event, data, context)
//!   ├─► subscribers of `event` and `*`, priority desc
//!   │     └─► chain: Continue │ Replace{data, context} │ Block{reason}
//!   │           └─► delivery: handler with retries → quarantine → fallback
//!   └─► post_process(emission, report) on every middleware
//!         ├─ router: forward to interested contexts
//!         └─ batching: queue for the coalescing window
//! ```
//!
//! ## Features
//! | Area              | Description                                                | Key types / traits                          |
//! |-------------------|------------------------------------------------------------|---------------------------------------------|
//! | **Bus context**   | Owns manager, router, registry, codec and diagnostics.     | [`BusNode`]                                 |
//! | **Subscribers**   | Register handlers and emit events.                         | [`SubscriberManager`], [`Handler`], [`HandlerFn`] |
//! | **Groups**        | Release a component's subscriptions together.              | [`SubscriptionGroup`]                       |
//! | **Middleware**    | Ordered, prioritized pipeline shared by all subscribers.   | [`Middleware`], [`Flow`]                    |
//! | **Routing**       | Cross-context interest announcements and forwarding.       | [`Router`], [`Transport`], [`InMemoryHub`]  |
//! | **Codec**         | Rich payloads to a tagged JSON envelope and back.          | [`Codec`], [`Value`]                        |
//! | **Categories**    | Hierarchical, multi-dimensional event classification.      | [`CategoryRegistry`], [`ResolveStrategy`]   |
//! | **Policies**      | Retry backoff, quarantine and fallback.                    | [`BackoffPolicy`], [`QuarantinePolicy`], [`FallbackBehavior`] |
//! | **Errors**        | Typed errors with stable labels.                           | [`BusError`], [`HandlerError`], [`TransportError`] |
//! | **Diagnostics**   | Internal events fanned out to observers.                   | [`DiagnosticBus`], [`Observe`]              |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], a `tracing`-backed diagnostics observer.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use relaybus::{
//!     BusConfig, BusNode, ContextRole, Delivery, EmitContext, HandlerError, HandlerFn, InMemoryHub,
//!     SubscriberOptions, Value,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = InMemoryHub::new();
//!
//!     let (t, rx) = hub.attach("bg", ContextRole::Orchestrator);
//!     let bg = BusNode::builder("bg", BusConfig::default()).transport(t, rx).build()?;
//!
//!     let (t, rx) = hub.attach("A", ContextRole::Peer);
//!     let a = BusNode::builder("A", BusConfig::default())
//!         .orchestrator("bg")
//!         .transport(t, rx)
//!         .build()?;
//!
//!     let print = HandlerFn::arc("print", |d: Delivery| async move {
//!         println!("{} from {:?}", d.event, d.context.source_context);
//!         Ok::<_, HandlerError>(Value::Null)
//!     });
//!     a.subscribe("ping", print, SubscriberOptions::new()).await?;
//!     tokio::time::sleep(Duration::from_millis(10)).await;
//!
//!     bg.emit("ping", "hello", EmitContext::new()).await;
//!     tokio::time::sleep(Duration::from_millis(10)).await;
//!
//!     a.shutdown().await;
//!     bg.shutdown().await;
//!     Ok(())
//! }
//! ```

mod bus;
mod config;
mod diagnostics;
mod error;
mod node;
mod observers;
mod policies;
mod value;

pub mod categories;
pub mod codec;
pub mod middleware;
pub mod routing;
pub mod transport;

// ---- Public re-exports ----

pub use bus::{
    BoxHandlerFuture, BusHandle, Delivery, EmitContext, EmitReport, Emission, EventContext, EventPattern, EventStats,
    Handler, HandlerFn, HandlerRef, ManagerBuilder, Outcome, Subscriber, SubscriberId, SubscriberManager,
    SubscriberOptions, SubscriberResponse, SubscriberState, SubscriberStats, SubscriberStatus, SubscriberUpdate,
    SubscriptionGroup, Transformation, Unsubscribe, WILDCARD,
};
pub use categories::{CategoryDef, CategoryOptions, CategoryPattern, CategoryRegistry, Resolution, ResolveStrategy};
pub use codec::{Codec, CodecStats};
pub use config::BusConfig;
pub use diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
pub use error::{BusError, CategoryError, CodecError, HandlerError, TransportError};
pub use middleware::{Flow, Middleware, MiddlewareRef};
pub use node::{BusNode, BusNodeBuilder};
pub use observers::{Observe, ObserverSet};
pub use policies::{BackoffPolicy, FallbackBehavior, JitterPolicy, QuarantinePolicy};
pub use routing::{ContextId, ContextRole, Router, RouterStats, WireMessage};
pub use transport::{InMemoryHub, Transport, TransportRef};
pub use value::{DomDescriptor, ErrorValue, FunctionDescriptor, Map, SharedValue, Value};

// Optional: a tracing-backed diagnostics observer.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use observers::LogWriter;
