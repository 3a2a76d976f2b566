//! # Cross-context routing.
//!
//! Contexts share no memory; interest and events travel as [`WireMessage`]s
//! over a [`ChannelChain`] built on a [`Transport`](crate::transport::Transport).
//!
//! ```text
//! peer A: subscribe("ping")
//!   └─► announce ─► direct(orchestrator) ─► orchestrator records A, re-gossips to peers
//! peer B: emit("ping")
//!   └─► post_process: remote["ping"] = {A}
//!         └─► routed-event ─► orchestrator ─► relay to A
//!               └─► A: emit("ping", { cross_context, source_context: B, routed_by: orchestrator })
//! ```
//!
//! ## Rules
//! - The routing table only grows; interest is never retracted.
//! - Each event type is announced at most once per context lifetime.
//! - Routed emissions are never forwarded again.
//! - Channel failures fall through to the next channel; if all fail the message is dropped.

mod channel;
mod context;
mod message;
mod router;
mod table;

pub use channel::{Channel, ChannelChain, DirectChannel, DurableChannel, FanOutChannel, DURABLE_KEY};
pub use context::{ContextId, ContextRole};
pub use message::{Announcement, RoutedEvent, WireMessage};
pub use router::{Router, RouterStats};
pub use table::RoutingTable;
