//! # Non-blocking fan-out of diagnostics to observers.
//!
//! ```text
//! emit(diag)
//!     ├──► [queue 1] ──► worker 1 ──► observer1.on_diagnostic()
//!     │    (bounded)         └──────► panic → ObserverPanicked
//!     └──► [queue N] ──► worker N ──► observerN.on_diagnostic()
//! ```
//!
//! ## Rules
//! - **Non-blocking**: `emit()` uses `try_send` and returns immediately.
//! - **Overflow**: dropped for that observer only, `ObserverOverflow` published.
//! - **Isolation**: a panicking observer is reported and keeps its worker alive.
//! - **Per-observer FIFO**.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::{Diagnostic, DiagnosticBus, DiagnosticKind};
use crate::observers::Observe;

struct ObserverChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Diagnostic>>,
}

/// Fan-out coordinator for diagnostic observers.
pub struct ObserverSet {
    channels: Vec<ObserverChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: DiagnosticBus,
}

impl ObserverSet {
    /// Creates a new set and spawns one worker per observer.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observe>>, bus: DiagnosticBus) -> Self {
        let mut channels = Vec::with_capacity(observers.len());
        let mut workers = Vec::with_capacity(observers.len());

        for obs in observers {
            let cap = obs.queue_capacity().max(1);
            let name = obs.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Diagnostic>>(cap);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(diag) = rx.recv().await {
                    let fut = obs.on_diagnostic(diag.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
                            (*msg).to_string()
                        } else if let Some(msg) = panic_err.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        bus_for_worker.publish(Diagnostic::observer_panicked(obs.name(), info));
                    }
                }
            });
            channels.push(ObserverChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Forwards every diagnostic published on the bus to the observers until `token` is cancelled.
    pub fn listen(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let me = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(diag) => me.emit(diag),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "diagnostics listener lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    /// Fans one diagnostic out to every observer (non-blocking).
    ///
    /// Overflow diagnostics are not re-published when they overflow themselves.
    pub fn emit(&self, diag: Diagnostic) {
        let is_overflow = matches!(diag.kind, DiagnosticKind::ObserverOverflow);
        let diag = Arc::new(diag);

        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&diag)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) if !is_overflow => {
                    self.bus
                        .publish(Diagnostic::observer_overflow(channel.name, "full"));
                }
                Err(mpsc::error::TrySendError::Closed(_)) if !is_overflow => {
                    self.bus
                        .publish(Diagnostic::observer_overflow(channel.name, "closed"));
                }
                Err(_) => {}
            }
        }
    }

    /// Closes all queues and waits for the workers to drain.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    /// True if there are no observers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct Collect(Mutex<Vec<DiagnosticKind>>);

    #[async_trait]
    impl Observe for Collect {
        async fn on_diagnostic(&self, diag: &Diagnostic) {
            self.0.lock().await.push(diag.kind);
        }
    }

    struct Explodes;

    #[async_trait]
    impl Observe for Explodes {
        async fn on_diagnostic(&self, _diag: &Diagnostic) {
            panic!("observer blew up");
        }
        fn name(&self) -> &'static str {
            "explodes"
        }
    }

    #[tokio::test]
    async fn panicking_observer_is_reported() {
        let bus = DiagnosticBus::new(16);
        let mut rx = bus.subscribe();
        let collect = Arc::new(Collect(Mutex::new(Vec::new())));
        let set = ObserverSet::new(vec![collect.clone(), Arc::new(Explodes)], bus.clone());

        set.emit(Diagnostic::new(DiagnosticKind::SubscriberAdded));

        let reported = rx.recv().await.expect("panic diagnostic");
        assert_eq!(reported.kind, DiagnosticKind::ObserverPanicked);
        assert_eq!(reported.subscriber.as_deref(), Some("explodes"));

        set.shutdown().await;
        assert_eq!(*collect.0.lock().await, vec![DiagnosticKind::SubscriberAdded]);
    }
}
