//! # Subscribers.
//!
//! A [`Subscriber`] is created by the manager on `subscribe` and holds the
//! handler, the preferences, the mutable status that middleware update, and its
//! own ordered list of middleware.
//!
//! ## Rules
//! - Middleware are kept in ascending priority, ties by registration order.
//! - Status and preferences sit behind synchronous locks that are never held across `.await`.
//! - A destroyed subscriber never becomes active again.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::bus::handler::HandlerRef;
use crate::bus::options::SubscriberOptions;
use crate::middleware::MiddlewareRef;

/// Unique (per manager) subscriber id; increases with subscription order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl SubscriberId {
    /// Raw sequence number.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubscriberState {
    /// Receives deliveries.
    #[default]
    Active,
    /// Temporarily skipped.
    Paused,
    /// Skipped until re-enabled.
    Disabled,
    /// Removed; terminal.
    Destroyed,
}

impl SubscriberState {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubscriberState::Active => "active",
            SubscriberState::Paused => "paused",
            SubscriberState::Disabled => "disabled",
            SubscriberState::Destroyed => "destroyed",
        }
    }
}

/// Mutable counters and timestamps of a subscriber.
#[derive(Clone, Debug)]
pub struct SubscriberStatus {
    /// Lifecycle state.
    pub state: SubscriberState,
    /// Completed deliveries (successful or not).
    pub execution_count: u64,
    /// Cumulative exhausted deliveries since the last success.
    pub failure_count: u32,
    /// Suspended by the circuit breaker.
    pub quarantined: bool,
    /// End of the current suspension.
    pub quarantine_until: Option<Instant>,
    /// Last handler invocation.
    pub last_executed: Option<Instant>,
    /// Last time the subscriber saw any dispatch.
    pub last_active: Instant,
}

/// A registered subscriber.
pub struct Subscriber {
    id: SubscriberId,
    event_type: Arc<str>,
    handler: HandlerRef,
    options: RwLock<SubscriberOptions>,
    status: Mutex<SubscriberStatus>,
    middlewares: RwLock<Vec<MiddlewareRef>>,
    created_at: Instant,
}

impl Subscriber {
    pub(crate) fn new(
        id: SubscriberId,
        event_type: Arc<str>,
        handler: HandlerRef,
        options: SubscriberOptions,
        middlewares: Vec<MiddlewareRef>,
    ) -> Self {
        let now = Instant::now();
        let sub = Self {
            id,
            event_type,
            handler,
            options: RwLock::new(options),
            status: Mutex::new(SubscriberStatus {
                state: SubscriberState::Active,
                execution_count: 0,
                failure_count: 0,
                quarantined: false,
                quarantine_until: None,
                last_executed: None,
                last_active: now,
            }),
            middlewares: RwLock::new(Vec::new()),
            created_at: now,
        };
        for mw in middlewares {
            sub.attach(mw);
        }
        sub
    }

    /// Subscriber id.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Event type (or `*`).
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub(crate) fn event_type_arc(&self) -> Arc<str> {
        Arc::clone(&self.event_type)
    }

    /// Handler.
    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    /// Snapshot of the preferences.
    pub fn options(&self) -> SubscriberOptions {
        self.options.read().clone()
    }

    /// Priority among siblings.
    pub fn priority(&self) -> i32 {
        self.options.read().priority
    }

    /// Snapshot of the status.
    pub fn status(&self) -> SubscriberStatus {
        self.status.lock().clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriberState {
        self.status.lock().state
    }

    /// Creation time.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Names of the attached middleware, in execution order.
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middlewares.read().iter().map(|m| m.name()).collect()
    }

    pub(crate) fn middlewares(&self) -> Vec<MiddlewareRef> {
        self.middlewares.read().clone()
    }

    /// Inserts `mw` after every middleware of lower or equal priority.
    pub(crate) fn attach(&self, mw: MiddlewareRef) {
        let mut list = self.middlewares.write();
        let at = list.partition_point(|m| m.priority() <= mw.priority());
        list.insert(at, mw);
    }

    pub(crate) fn with_status<R>(&self, f: impl FnOnce(&mut SubscriberStatus) -> R) -> R {
        f(&mut self.status.lock())
    }

    pub(crate) fn with_options<R>(&self, f: impl FnOnce(&mut SubscriberOptions) -> R) -> R {
        f(&mut self.options.write())
    }

    /// Sets the state unless the subscriber is already destroyed.
    pub(crate) fn set_state(&self, state: SubscriberState) -> bool {
        self.with_status(|s| {
            if s.state == SubscriberState::Destroyed {
                return false;
            }
            s.state = state;
            true
        })
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("handler", &self.handler.name())
            .field("state", &self.state())
            .finish()
    }
}
