use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use relaybus::{
    BusConfig, BusNode, ContextId, ContextRole, Delivery, EmitContext, HandlerError, HandlerFn, InMemoryHub,
    SubscriberOptions, Value,
};

fn node(hub: &InMemoryHub, id: &str, role: ContextRole) -> BusNode {
    let (transport, inbound) = hub.attach(id, role);
    BusNode::builder(id, BusConfig::default())
        .orchestrator("bg")
        .transport(transport, inbound)
        .with_default_pipeline()
        .build()
        .unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test(start_paused = true)]
async fn ping_reaches_the_subscribed_context() {
    let hub = InMemoryHub::new();
    let bg = node(&hub, "bg", ContextRole::Orchestrator);
    let a = node(&hub, "A", ContextRole::Peer);
    let b = node(&hub, "B", ContextRole::Peer);

    let seen: Arc<Mutex<Vec<Delivery>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let h = HandlerFn::arc("ping", move |d: Delivery| {
        sink.lock().push(d);
        async { Ok::<_, HandlerError>(Value::Null) }
    });
    a.subscribe("ping", h, SubscriberOptions::new()).await.unwrap();
    settle().await;

    let b_router = b.router().unwrap();
    assert!(b_router.remote_subscribers("ping").contains(&ContextId::from("A")));

    b.emit("ping", json!({"n": 1}), EmitContext::new()).await;
    settle().await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    let d = &seen[0];
    assert_eq!(&*d.event, "ping");
    assert_eq!(d.data, Value::from(json!({"n": 1})));
    assert!(d.context.cross_context);
    assert_eq!(d.context.source_context, Some(ContextId::from("B")));
    assert_eq!(d.context.routed_by, Some(ContextId::from("bg")));

    assert_eq!(b_router.stats().forwarded, 1);
    assert_eq!(a.router().unwrap().stats().received, 1);

    for n in [&a, &b, &bg] {
        n.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn orchestrator_emissions_fan_out_to_peers() {
    let hub = InMemoryHub::new();
    let bg = node(&hub, "bg", ContextRole::Orchestrator);
    let a = node(&hub, "A", ContextRole::Peer);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let h = HandlerFn::arc("status", move |d: Delivery| {
        sink.lock().push(d.context.source_context.clone());
        async { Ok::<_, HandlerError>(Value::Null) }
    });
    a.subscribe("status", h, SubscriberOptions::new()).await.unwrap();
    settle().await;

    bg.emit("status", "ready", EmitContext::new()).await;
    settle().await;
    assert_eq!(*seen.lock(), vec![Some(ContextId::from("bg"))]);

    a.shutdown().await;
    bg.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn emissions_without_remote_interest_stay_local() {
    let hub = InMemoryHub::new();
    let bg = node(&hub, "bg", ContextRole::Orchestrator);
    let b = node(&hub, "B", ContextRole::Peer);

    b.emit("nobody-cares", Value::Null, EmitContext::new()).await;
    settle().await;
    assert_eq!(b.router().unwrap().stats().forwarded, 0);
    assert_eq!(bg.router().unwrap().stats().received, 0);

    b.shutdown().await;
    bg.shutdown().await;
}
