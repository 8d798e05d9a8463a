//! Handler references and resolution.
//!
//! Routes name their handler either inline (a closure) or by identifier. An
//! identifier is looked up in the application's [`HandlerRegistry`] first,
//! then in an optional external [`HandlerResolver`] that owns dependency
//! injection and is opaque to the kernel.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::HandlerContext;
use crate::error::Fault;
use crate::http::Body;
use crate::kernel::Kernel;

/// Type-erased handler shared between routes and threads.
pub type Handler = Arc<dyn Fn(&mut HandlerContext<'_, '_>) -> Result<Reply, Fault> + Send + Sync>;

/// Work a handler hands back to run after the response event, instead of a
/// body. It is responsible for calling `send` itself.
pub type Deferred = Box<dyn FnOnce(&mut Kernel<'_>) -> Result<(), Fault>>;

/// What a handler returns.
pub enum Reply {
    /// Nothing to send beyond captured output.
    Empty,
    /// A value to send.
    Body(Body),
    /// Invoked directly instead of sending.
    Deferred(Deferred),
}

impl Reply {
    pub fn deferred<F>(f: F) -> Self
    where
        F: FnOnce(&mut Kernel<'_>) -> Result<(), Fault> + 'static,
    {
        Self::Deferred(Box::new(f))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Body(body) => f.debug_tuple("Body").field(body).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<Body> for Reply {
    fn from(body: Body) -> Self {
        Self::Body(body)
    }
}

macro_rules! reply_from {
    ($($ty:ty),+) => {
        $(impl From<$ty> for Reply {
            fn from(value: $ty) -> Self {
                Self::Body(Body::from(value))
            }
        })+
    };
}

reply_from!(&str, String, serde_json::Value, bytes::Bytes, Vec<u8>);

/// How a route refers to its handler.
#[derive(Clone)]
pub enum HandlerRef {
    /// Resolved by name at dispatch time.
    Name(String),
    Func(Handler),
}

impl HandlerRef {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_, '_>) -> Result<Reply, Fault> + Send + Sync + 'static,
    {
        Self::Func(Arc::new(f))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Func(_) => None,
        }
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.debug_tuple("Name").field(name).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

impl From<&str> for HandlerRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for HandlerRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Handler> for HandlerRef {
    fn from(handler: Handler) -> Self {
        Self::Func(handler)
    }
}

/// Maps a handler identifier to something invocable.
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Handler>;
}

/// Handlers registered by name on the application.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut HandlerContext<'_, '_>) -> Result<Reply, Fault> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).cloned()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
