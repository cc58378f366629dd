//! Method table and the handler contract

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub use crate::pool::Job;

/// What a handler produced for one call
pub enum Reply {
    /// Result available right away, answered on the caller's stack
    Immediate(Value),
    /// Work to run on the worker pool
    Deferred(Job),
}

impl Reply {
    pub fn deferred<F>(job: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Value> + Send + 'static,
    {
        Reply::Deferred(Box::new(job))
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Immediate(value)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Reply::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// A method implementation.
///
/// Return an [`RpcError`](tandem_core::RpcError) through `anyhow` for
/// protocol-level failures; any other error is reported as an internal error.
pub trait Handler: Send + Sync {
    fn call(&self, params: Option<Value>) -> anyhow::Result<Reply>;
}

impl<F> Handler for F
where
    F: Fn(Option<Value>) -> anyhow::Result<Reply> + Send + Sync,
{
    fn call(&self, params: Option<Value>) -> anyhow::Result<Reply> {
        self(params)
    }
}

/// Lookup from method name to handler
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure for `method`, replacing any previous handler
    pub fn register<F>(&mut self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        self.register_handler(method, handler);
    }

    pub fn register_handler<H>(&mut self, method: impl Into<String>, handler: H)
    where
        H: Handler + 'static,
    {
        self.handlers.insert(method.into(), Arc::new(handler));
    }

    pub fn with_method<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        self.register(method, handler);
        self
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(method).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
        methods.sort();
        methods
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.methods())
            .finish()
    }
}
