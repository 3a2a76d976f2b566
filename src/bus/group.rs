//! # Subscription groups.
//!
//! A [`SubscriptionGroup`] tracks the subscriptions one component makes so
//! they can be released together, either by [`SubscriptionGroup::deactivate`]
//! or when the group is dropped.
//!
//! ```rust
//! use relaybus::{BusConfig, BusNode, Delivery, HandlerError, HandlerFn, SubscriberOptions, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = BusNode::builder("panel", BusConfig::default()).build()?;
//!     let group = node.group();
//!
//!     let noop = HandlerFn::arc("noop", |_d: Delivery| async { Ok::<_, HandlerError>(Value::Null) });
//!     group.subscribe("open", noop.clone(), SubscriberOptions::new()).await?;
//!     group.subscribe("close", noop, SubscriberOptions::new()).await?;
//!     assert_eq!(group.deactivate(), 2);
//!
//!     node.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::fmt;

use parking_lot::Mutex;

use crate::bus::handler::HandlerRef;
use crate::bus::manager::{BusHandle, Unsubscribe};
use crate::bus::options::{SubscriberOptions, Transformation};
use crate::bus::subscriber::SubscriberId;
use crate::error::BusError;

/// Subscriptions released as one unit.
pub struct SubscriptionGroup {
    bus: BusHandle,
    handles: Mutex<Vec<Unsubscribe>>,
}

impl SubscriptionGroup {
    /// Empty group on the manager behind `bus`.
    pub fn new(bus: BusHandle) -> Self {
        Self {
            bus,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Subscribes and tracks the subscription.
    pub async fn subscribe(
        &self,
        event_type: &str,
        handler: HandlerRef,
        options: SubscriberOptions,
    ) -> Result<SubscriberId, BusError> {
        let manager = self.bus.manager().ok_or(BusError::Destroyed)?;
        let handle = manager.subscribe(event_type, handler, options).await?;
        let id = handle.id();
        self.handles.lock().push(handle);
        Ok(id)
    }

    /// Like [`subscribe`](Self::subscribe), running `transforms` before the
    /// transformations already present in `options`.
    pub async fn subscribe_with_transforms(
        &self,
        event_type: &str,
        handler: HandlerRef,
        transforms: Vec<Transformation>,
        mut options: SubscriberOptions,
    ) -> Result<SubscriberId, BusError> {
        let rest = std::mem::take(&mut options.transformations);
        options.transformations = transforms.into_iter().chain(rest).collect();
        self.subscribe(event_type, handler, options).await
    }

    /// Number of tracked subscriptions.
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// True if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Removes every tracked subscriber; returns how many were still registered.
    ///
    /// The group stays usable afterwards.
    pub fn deactivate(&self) -> usize {
        let handles = std::mem::take(&mut *self.handles.lock());
        let removed = handles.iter().filter(|h| h.unsubscribe()).count();
        if removed > 0 {
            tracing::debug!(removed, "subscription group deactivated");
        }
        removed
    }
}

impl Drop for SubscriptionGroup {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl fmt::Debug for SubscriptionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionGroup")
            .field("subscriptions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::bus::{Delivery, EmitContext, HandlerFn, SubscriberManager};
    use crate::config::BusConfig;
    use crate::diagnostics::DiagnosticBus;
    use crate::error::HandlerError;
    use crate::middleware::Transform;
    use crate::value::Value;

    fn manager() -> SubscriberManager {
        SubscriberManager::builder(&BusConfig::default())
            .middleware(Arc::new(Transform::new(DiagnosticBus::new(8))))
            .build()
    }

    #[tokio::test]
    async fn deactivate_releases_every_subscription() {
        let mgr = manager();
        let group = SubscriptionGroup::new(mgr.handle());
        let noop = HandlerFn::arc("noop", |_d: Delivery| async { Ok::<_, HandlerError>(Value::Null) });
        let first = group
            .subscribe("a", noop.clone(), SubscriberOptions::new())
            .await
            .unwrap();
        group.subscribe("b", noop.clone(), SubscriberOptions::new()).await.unwrap();
        mgr.subscribe("a", noop, SubscriberOptions::new()).await.unwrap();
        assert_eq!(group.len(), 2);

        assert!(mgr.unsubscribe("a", first));
        assert_eq!(group.deactivate(), 1);
        assert!(group.is_empty());
        assert_eq!(mgr.subscriber_count("a"), 1);
        assert_eq!(mgr.subscriber_count("b"), 0);
    }

    #[tokio::test]
    async fn dropping_the_group_unsubscribes() {
        let mgr = manager();
        {
            let group = SubscriptionGroup::new(mgr.handle());
            let noop = HandlerFn::arc("noop", |_d: Delivery| async { Ok::<_, HandlerError>(Value::Null) });
            group.subscribe("a", noop, SubscriberOptions::new()).await.unwrap();
            assert_eq!(mgr.subscriber_count("a"), 1);
        }
        assert_eq!(mgr.subscriber_count("a"), 0);
    }

    #[tokio::test]
    async fn group_transforms_run_first() {
        let mgr = manager();
        let group = SubscriptionGroup::new(mgr.handle());
        let echo = HandlerFn::arc("echo", |d: Delivery| async move { Ok::<_, HandlerError>(d.data) });
        let wrap: Transformation = Arc::new(|v: &Value, _: &mut EmitContext| {
            let mut out = Value::object();
            out.insert("inner", v.clone());
            Ok::<_, String>(out)
        });
        let opts = SubscriberOptions::new().transform(|v: &Value, _: &mut EmitContext| {
            let mut out = v.clone();
            out.insert("seen", true);
            Ok(out)
        });
        group
            .subscribe_with_transforms("t", echo, vec![wrap], opts)
            .await
            .unwrap();

        let report = mgr.emit("t", Value::from(1), EmitContext::new()).await;
        assert_eq!(
            report.delivered().next(),
            Some(&Value::from(json!({"inner": 1, "seen": true})))
        );
    }

    #[tokio::test]
    async fn subscribing_on_a_dropped_manager_fails() {
        let group = SubscriptionGroup::new(manager().handle());
        let noop = HandlerFn::arc("noop", |_d: Delivery| async { Ok::<_, HandlerError>(Value::Null) });
        let err = group
            .subscribe("a", noop, SubscriberOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "bus_destroyed");
    }
}
