//! In-process message bus.
//!
//! Two dispatch styles live side by side:
//! - fire-and-forget messages, delivered to every handler registered for the
//!   message type (zero handlers is fine);
//! - request/response queries, answered by exactly one handler per request type.
//!
//! The bus is a cheap cloneable handle. Build it once at startup and pass it to
//! whatever needs to publish or register.

use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Anything that can travel over the bus.
pub trait Message: Any + Send + Sync + Debug {}

impl<T: Any + Send + Sync + Debug> Message for T {}

/// A message answered by a single handler.
pub trait Request: Message {
    type Response: Send + 'static;
}

pub trait MessageHandler<M: Message>: Send + Sync {
    fn handle(&self, message: &M) -> anyhow::Result<()>;
}

pub trait RequestHandler<R: Request>: Send + Sync {
    fn handle(&self, request: &R) -> anyhow::Result<R::Response>;
}

/// Closure-backed message handler.
pub struct ActionHandler<F>(pub F);

impl<M, F> MessageHandler<M> for ActionHandler<F>
where
    M: Message,
    F: Fn(&M) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, message: &M) -> anyhow::Result<()> {
        (self.0)(message)
    }
}

/// Closure-backed request handler.
pub struct FnRequestHandler<F>(pub F);

impl<R, F> RequestHandler<R> for FnRequestHandler<F>
where
    R: Request,
    F: Fn(&R) -> anyhow::Result<R::Response> + Send + Sync,
{
    fn handle(&self, request: &R) -> anyhow::Result<R::Response> {
        (self.0)(request)
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Request handler for {request} is not registered")]
    NoRequestHandler { request: &'static str },

    #[error("Request handler for {request} already exists")]
    RequestHandlerExists { request: &'static str },

    #[error("Request handler for {request} failed: {source}")]
    Handler {
        request: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Type-erased handler slot. The box always holds an `Arc<dyn MessageHandler<M>>`
/// (or `Arc<dyn RequestHandler<R>>`) for the `TypeId` it is filed under.
type ErasedHandler = Box<dyn Any + Send + Sync>;

#[derive(Default)]
struct Inner {
    handlers: HashMap<TypeId, Vec<(usize, ErasedHandler)>>,
    request_handlers: HashMap<TypeId, ErasedHandler>,
}

#[derive(Clone, Default)]
pub struct Bus {
    inner: Arc<RwLock<Inner>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for messages of type `M`. Registering the same
    /// handler twice is a no-op.
    pub fn register_handler<M, H>(&self, handler: Arc<H>)
    where
        M: Message,
        H: MessageHandler<M> + 'static,
    {
        let key = handler_key(&handler);
        let erased: Arc<dyn MessageHandler<M>> = handler;

        let mut inner = self.inner.write();
        let handlers = inner.handlers.entry(TypeId::of::<M>()).or_default();
        if handlers.iter().any(|(existing, _)| *existing == key) {
            return;
        }
        handlers.push((key, Box::new(erased)));
        debug!(target: "bus", message = type_name::<M>(), "registered handler");
    }

    /// Returns `true` if the handler was registered.
    pub fn unregister_handler<M, H>(&self, handler: &Arc<H>) -> bool
    where
        M: Message,
        H: MessageHandler<M> + 'static,
    {
        let key = handler_key(handler);
        let mut inner = self.inner.write();
        let Some(handlers) = inner.handlers.get_mut(&TypeId::of::<M>()) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != key);
        before != handlers.len()
    }

    /// Deliver `message` to every handler of its type. Handler failures are
    /// logged and do not stop delivery to the remaining handlers.
    pub fn send<M: Message>(&self, message: M) {
        let handlers = self.message_handlers::<M>();

        if handlers.is_empty() {
            debug!(target: "bus", message = type_name::<M>(), "message was not handled");
            return;
        }

        debug!(target: "bus", message = ?message, handlers = handlers.len(), "dispatching");
        for handler in handlers {
            if let Err(e) = handler.handle(&message) {
                error!(
                    target: "bus",
                    message = type_name::<M>(),
                    error = %e,
                    "message handler failed"
                );
            }
        }
    }

    pub fn register_request_handler<R, H>(
        &self,
        handler: Arc<H>,
        replace_if_exists: bool,
    ) -> Result<(), BusError>
    where
        R: Request,
        H: RequestHandler<R> + 'static,
    {
        let erased: Arc<dyn RequestHandler<R>> = handler;
        let mut inner = self.inner.write();
        let key = TypeId::of::<R>();

        if !replace_if_exists && inner.request_handlers.contains_key(&key) {
            return Err(BusError::RequestHandlerExists {
                request: type_name::<R>(),
            });
        }

        if inner.request_handlers.insert(key, Box::new(erased)).is_some() {
            warn!(target: "bus", request = type_name::<R>(), "replaced request handler");
        }
        Ok(())
    }

    /// Returns `true` if a handler for `R` was registered.
    pub fn unregister_request_handler<R: Request>(&self) -> bool {
        self.inner
            .write()
            .request_handlers
            .remove(&TypeId::of::<R>())
            .is_some()
    }

    pub fn query<R: Request>(&self, request: &R) -> Result<R::Response, BusError> {
        let handler = {
            let inner = self.inner.read();
            inner
                .request_handlers
                .get(&TypeId::of::<R>())
                .and_then(|erased| erased.downcast_ref::<Arc<dyn RequestHandler<R>>>())
                .cloned()
        };

        let handler = handler.ok_or(BusError::NoRequestHandler {
            request: type_name::<R>(),
        })?;

        debug!(target: "bus", request = ?request, "querying");
        handler.handle(request).map_err(|source| {
            error!(
                target: "bus",
                request = type_name::<R>(),
                error = %source,
                "request handler failed"
            );
            BusError::Handler {
                request: type_name::<R>(),
                source,
            }
        })
    }

    fn message_handlers<M: Message>(&self) -> Vec<Arc<dyn MessageHandler<M>>> {
        let inner = self.inner.read();
        inner
            .handlers
            .get(&TypeId::of::<M>())
            .map(|handlers| {
                handlers
                    .iter()
                    .filter_map(|(_, erased)| {
                        erased.downcast_ref::<Arc<dyn MessageHandler<M>>>().cloned()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn handler_key<T: ?Sized>(handler: &Arc<T>) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}
