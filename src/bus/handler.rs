//! # Subscriber handlers.
//!
//! A [`Handler`] turns one [`Delivery`] into a response value. The common
//! handle type is [`HandlerRef`], an `Arc<dyn Handler>` shared between the
//! subscriber and the delivery middleware (which may call it several times
//! when retrying).
//!
//! [`HandlerFn`] wraps a closure that *creates* a new future per call:
//!
//! ```rust
//! use relaybus::{Delivery, HandlerError, HandlerFn, HandlerRef};
//!
//! let h: HandlerRef = HandlerFn::arc("echo", |d: Delivery| async move {
//!     Ok::<_, HandlerError>(d.data)
//! });
//! assert_eq!(h.name(), "echo");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::bus::context::EmitContext;
use crate::bus::subscriber::SubscriberId;
use crate::error::HandlerError;
use crate::value::Value;

/// Boxed future returned by [`Handler::call`].
pub type BoxHandlerFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send + 'static>>;

/// Shared handle to a handler.
pub type HandlerRef = Arc<dyn Handler>;

/// What a handler receives.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Event type.
    pub event: Arc<str>,
    /// Payload (after transformation and serialization).
    pub data: Value,
    /// Context bag.
    pub context: EmitContext,
    /// Subscriber being delivered to.
    pub subscriber: SubscriberId,
}

/// Subscriber callback.
pub trait Handler: Send + Sync + 'static {
    /// Returns a stable, human-readable handler name.
    fn name(&self) -> &str;

    /// Creates a new future handling `delivery`.
    fn call(&self, delivery: Delivery) -> BoxHandlerFuture;
}

/// Function-backed handler.
#[derive(Debug)]
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, delivery: Delivery) -> BoxHandlerFuture {
        Box::pin((self.f)(delivery))
    }
}
