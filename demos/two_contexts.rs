//! # Demo: two_contexts
//!
//! Three contexts on one in-memory hub: an orchestrator (`bg`) and two peers
//! (`extractor`, `display`).
//!
//! ## Flow
//! ```text
//! display: subscribe("article-ready")
//!   └─► announcement ─► bg ─► gossip ─► extractor
//! extractor: emit("article-ready", {...})
//!   └─► routed event ─► bg ─► relay ─► display handler
//!                                       (cross_context, source_context = extractor)
//! ```
//!
//! Diagnostics of every context are printed by a small observer.
//!
//! ## Run
//! ```bash
//! cargo run --example two_contexts
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use relaybus::{
    BusConfig, BusNode, ContextRole, Delivery, Diagnostic, EmitContext, HandlerError, HandlerFn, InMemoryHub, Observe,
    SubscriberOptions, Value,
};

struct Printer(&'static str);

#[async_trait]
impl Observe for Printer {
    async fn on_diagnostic(&self, diag: &Diagnostic) {
        println!(
            "[{}] {:?} event={:?} via={:?}",
            self.0,
            diag.kind,
            diag.event.as_deref(),
            diag.context.as_deref()
        );
    }

    fn name(&self) -> &'static str {
        "printer"
    }
}

fn node(hub: &InMemoryHub, id: &'static str, role: ContextRole) -> Result<BusNode, Box<dyn std::error::Error>> {
    let (transport, inbound) = hub.attach(id, role);
    let printer: Arc<dyn Observe> = Arc::new(Printer(id));
    let node = BusNode::builder(id, BusConfig::default())
        .orchestrator("bg")
        .transport(transport, inbound)
        .with_default_pipeline()
        .observers(vec![printer])
        .build()?;
    Ok(node)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let hub = InMemoryHub::new();
    let bg = node(&hub, "bg", ContextRole::Orchestrator)?;
    let extractor = node(&hub, "extractor", ContextRole::Peer)?;
    let display = node(&hub, "display", ContextRole::Peer)?;

    let render = HandlerFn::arc("render", |d: Delivery| async move {
        println!(
            "[display] {} from {:?}: {:?}",
            d.event,
            d.context.source_context.as_ref().map(|c| c.to_string()),
            d.data.get("title").and_then(Value::as_str)
        );
        Ok::<_, HandlerError>(Value::Null)
    });
    display
        .subscribe("article-ready", render, SubscriberOptions::new())
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    extractor
        .emit(
            "article-ready",
            json!({"title": "Hello from the extractor", "words": 1200}),
            EmitContext::new(),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    if let Some(router) = extractor.router() {
        println!("[extractor] router stats: {:?}", router.stats());
    }

    display.shutdown().await;
    extractor.shutdown().await;
    bg.shutdown().await;
    Ok(())
}
