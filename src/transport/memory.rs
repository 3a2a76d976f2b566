//! In-process transport.
//!
//! ```text
//! InMemoryHub
//!   ├─ endpoints: ContextId → (role, unbounded sender)
//!   └─ durable:   key → value, key → [(owner, listener)]
//! ```
//!
//! Durable listeners run on the writer's task, outside the hub lock, and are
//! not notified about their own context's writes or about unchanged values.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::routing::{ContextId, ContextRole, WireMessage};
use crate::transport::{DurableListener, Transport};

struct Endpoint {
    role: ContextRole,
    tx: mpsc::UnboundedSender<WireMessage>,
}

#[derive(Default)]
struct HubState {
    endpoints: HashMap<ContextId, Endpoint>,
    durable: HashMap<String, serde_json::Value>,
    listeners: HashMap<String, Vec<(ContextId, DurableListener)>>,
    closed: bool,
}

/// Connects several contexts in one process. Cheap to clone.
#[derive(Clone, Default)]
pub struct InMemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl InMemoryHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a context; returns its transport and its inbound queue.
    ///
    /// Attaching an id twice replaces the earlier endpoint.
    pub fn attach(
        &self,
        id: impl Into<ContextId>,
        role: ContextRole,
    ) -> (Arc<HubTransport>, mpsc::UnboundedReceiver<WireMessage>) {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .lock()
            .endpoints
            .insert(id.clone(), Endpoint { role, tx });
        tracing::debug!(context = %id, role = role.as_label(), "context attached to hub");
        let transport = HubTransport {
            hub: self.clone(),
            local: id,
            role,
        };
        (Arc::new(transport), rx)
    }

    /// Disconnects a context and its durable listeners.
    pub fn detach(&self, id: &ContextId) -> bool {
        let mut st = self.state.lock();
        for list in st.listeners.values_mut() {
            list.retain(|(owner, _)| owner != id);
        }
        st.endpoints.remove(id).is_some()
    }

    /// Closes the hub; every later send fails with [`TransportError::Closed`].
    pub fn close(&self) {
        let mut st = self.state.lock();
        st.closed = true;
        st.endpoints.clear();
        st.listeners.clear();
    }

    /// Connected context ids.
    pub fn contexts(&self) -> Vec<ContextId> {
        let mut ids: Vec<ContextId> = self.state.lock().endpoints.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current value of a durable key.
    pub fn durable_value(&self, key: &str) -> Option<serde_json::Value> {
        self.state.lock().durable.get(key).cloned()
    }
}

/// Transport of one context attached to an [`InMemoryHub`].
pub struct HubTransport {
    hub: InMemoryHub,
    local: ContextId,
    role: ContextRole,
}

impl HubTransport {
    fn deliver(&self, target: &ContextId, msg: WireMessage) -> Result<(), TransportError> {
        let st = self.hub.state.lock();
        if st.closed {
            return Err(TransportError::Closed);
        }
        let ep = st.endpoints.get(target).ok_or_else(|| TransportError::Unreachable {
            target: target.to_string(),
        })?;
        ep.tx.send(msg).map_err(|_| TransportError::Unreachable {
            target: target.to_string(),
        })
    }
}

#[async_trait]
impl Transport for HubTransport {
    fn local(&self) -> &ContextId {
        &self.local
    }

    fn role(&self) -> ContextRole {
        self.role
    }

    async fn send_to_one(&self, target: &ContextId, msg: WireMessage) -> Result<(), TransportError> {
        self.deliver(target, msg)
    }

    async fn send_to_all(&self, msg: WireMessage) -> Result<usize, TransportError> {
        if self.role != ContextRole::Orchestrator {
            return Err(TransportError::Unsupported {
                channel: "fan-out",
                reason: "only the orchestrator may fan out".into(),
            });
        }
        let st = self.hub.state.lock();
        if st.closed {
            return Err(TransportError::Closed);
        }
        let mut reached = 0;
        for (id, ep) in &st.endpoints {
            if *id == self.local || ep.role == ContextRole::Orchestrator {
                continue;
            }
            if ep.tx.send(msg.clone()).is_ok() {
                reached += 1;
            }
        }
        Ok(reached)
    }

    async fn durable_broadcast(&self, key: &str, value: serde_json::Value) -> Result<(), TransportError> {
        let listeners: Vec<DurableListener> = {
            let mut st = self.hub.state.lock();
            if st.closed {
                return Err(TransportError::Closed);
            }
            if st.durable.get(key) == Some(&value) {
                return Ok(());
            }
            st.durable.insert(key.to_owned(), value.clone());
            st.listeners
                .get(key)
                .into_iter()
                .flatten()
                .filter(|(owner, _)| *owner != self.local)
                .map(|(_, l)| Arc::clone(l))
                .collect()
        };
        for listener in listeners {
            listener(key, &value);
        }
        Ok(())
    }

    fn on_durable_change(&self, key: &str, listener: DurableListener) -> Result<(), TransportError> {
        let mut st = self.hub.state.lock();
        if st.closed {
            return Err(TransportError::Closed);
        }
        st.listeners
            .entry(key.to_owned())
            .or_default()
            .push((self.local.clone(), listener));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::routing::Announcement;

    fn announcement(from: &str) -> WireMessage {
        WireMessage::SubscriptionAnnouncement(Announcement {
            event_type: "ping".into(),
            source_context: ContextId::from(from),
            relayed_by: None,
        })
    }

    #[tokio::test]
    async fn fan_out_is_privileged() {
        let hub = InMemoryHub::new();
        let (orch, _orx) = hub.attach("bg", ContextRole::Orchestrator);
        let (peer, mut prx) = hub.attach("A", ContextRole::Peer);
        let (_other, mut qrx) = hub.attach("B", ContextRole::Peer);

        let err = peer.send_to_all(announcement("A")).await.unwrap_err();
        assert_eq!(err.as_label(), "transport_unsupported");

        assert_eq!(orch.send_to_all(announcement("bg")).await.unwrap(), 2);
        assert!(prx.try_recv().is_ok());
        assert!(qrx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unknown_target_is_unreachable() {
        let hub = InMemoryHub::new();
        let (a, _rx) = hub.attach("A", ContextRole::Peer);
        let err = a
            .send_to_one(&ContextId::from("nowhere"), announcement("A"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { .. }));

        hub.close();
        let err = a.send_to_one(&ContextId::from("A"), announcement("A")).await.unwrap_err();
        assert_eq!(err, TransportError::Closed);
    }

    #[tokio::test]
    async fn durable_changes_reach_other_contexts_only() {
        let hub = InMemoryHub::new();
        let (a, _arx) = hub.attach("A", ContextRole::Peer);
        let (b, _brx) = hub.attach("B", ContextRole::Peer);
        let seen_a = Arc::new(AtomicUsize::new(0));
        let seen_b = Arc::new(AtomicUsize::new(0));
        let ca = Arc::clone(&seen_a);
        let cb = Arc::clone(&seen_b);
        a.on_durable_change("k", Arc::new(move |_: &str, _: &serde_json::Value| {
            ca.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        b.on_durable_change("k", Arc::new(move |_: &str, _: &serde_json::Value| {
            cb.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        a.durable_broadcast("k", json!(1)).await.unwrap();
        a.durable_broadcast("k", json!(1)).await.unwrap();
        assert_eq!(seen_a.load(Ordering::SeqCst), 0);
        assert_eq!(seen_b.load(Ordering::SeqCst), 1);
        assert_eq!(hub.durable_value("k"), Some(json!(1)));
    }
}
