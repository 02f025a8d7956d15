//! Method registry boundary for RPC transports.
//!
//! A transport implements [`MethodRegistry`] to receive named handlers. [`MethodTable`] is the
//! in-process implementation: a name to handler map that can be called directly or wrapped by
//! any transport.

use std::{collections::HashMap, fmt, sync::Arc};

use bson::Bson;
use futures::future::BoxFuture;
use tracing::debug;

use docgate_core::error::InterfaceError;

/// Outcome of an RPC call: plain data, or the wrapped error.
pub type RpcResult = Result<Bson, InterfaceError>;

/// A registered method. Takes positional arguments and resolves to plain data.
pub type RpcHandler = Arc<dyn Fn(Vec<Bson>) -> BoxFuture<'static, RpcResult> + Send + Sync>;

/// Anything that can receive named RPC handlers.
pub trait MethodRegistry {
    /// Registers `handler` under `name`, replacing a previous registration.
    fn register(&mut self, name: String, handler: RpcHandler);
}

/// In-process method table.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, RpcHandler>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invokes the method registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownOperation` when nothing is registered under `name`, otherwise whatever
    /// the handler returns.
    pub async fn call(&self, name: &str, args: Vec<Bson>) -> RpcResult {
        let handler = self
            .methods
            .get(name)
            .cloned()
            .ok_or_else(|| InterfaceError::UnknownOperation(name.to_string()))?;

        debug!(method = name, args = args.len(), "calling RPC method");
        handler(args).await
    }

    /// Registered names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl MethodRegistry for MethodTable {
    fn register(&mut self, name: String, handler: RpcHandler) {
        self.methods.insert(name, handler);
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.method_names())
            .finish()
    }
}
