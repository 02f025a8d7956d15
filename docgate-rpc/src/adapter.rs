//! The RPC adapter: every interface operation as a named method.
//!
//! Methods are named `<prefix><model>:<operation>`, for example `api.pets:findOne`. Arguments
//! are positional and follow the [`SimpleInterface`] signatures:
//!
//! | operation  | arguments                         | result                   |
//! |------------|-----------------------------------|--------------------------|
//! | `find`     | `query?`                          | array of documents       |
//! | `findOne`  | `query?`                          | document or `null`       |
//! | `findById` | `id`                              | document or `null`       |
//! | `count`    | `query?`                          | number                   |
//! | `create`   | `fields`                          | created document         |
//! | `update`   | `query, fields, upsert?`          | documents written        |
//! | `patch`    | `query, patches`                  | documents patched        |
//! | `delete`   | `query`                           | documents deleted        |

use std::sync::Arc;

use bson::{Bson, Document};
use futures::FutureExt;
use tracing::debug;

use docgate_core::{
    backend::StoreBackend,
    dispatcher::SimpleInterface,
    error::{InterfaceError, InterfaceResult},
    operation::{OperationName, Query},
    patch::parse_patches,
};

use crate::registry::{MethodRegistry, RpcHandler, RpcResult};

/// Exposes a [`SimpleInterface`] through a [`MethodRegistry`].
#[derive(Debug)]
pub struct RpcAdapter<B: StoreBackend> {
    interface: Arc<SimpleInterface<B>>,
    prefix: String,
    model_name: String,
}

impl<B: StoreBackend + 'static> RpcAdapter<B> {
    /// Creates an adapter named after the interface's collection.
    pub fn new(interface: Arc<SimpleInterface<B>>, prefix: impl Into<String>) -> Self {
        let model_name = interface.model_name().to_string();
        Self::with_model_name(interface, prefix, model_name)
    }

    pub fn with_model_name(
        interface: Arc<SimpleInterface<B>>,
        prefix: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            interface,
            prefix: prefix.into(),
            model_name: model_name.into(),
        }
    }

    /// The prefix shared by every method name, `<prefix><model>:`.
    pub fn prefix(&self) -> String {
        format!("{}{}:", self.prefix, self.model_name)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn interface(&self) -> &Arc<SimpleInterface<B>> {
        &self.interface
    }

    /// The full method name of `operation`.
    pub fn method_name(&self, operation: OperationName) -> String {
        format!("{}{}", self.prefix(), operation)
    }

    /// Registers every operation with `registry`.
    pub fn register(&self, registry: &mut impl MethodRegistry) {
        for operation in OperationName::ALL {
            let name = self.method_name(operation);
            debug!(method = %name, "registering RPC method");
            registry.register(name, self.handler(operation));
        }
    }

    fn handler(&self, operation: OperationName) -> RpcHandler {
        match operation {
            OperationName::Find => bind(&self.interface, |interface, args| async move {
                let query = query_arg(&args, 0)?;
                let documents = interface.find(&query).await?;
                RpcResult::Ok(Bson::Array(documents.into_iter().map(Bson::Document).collect()))
            }),
            OperationName::FindOne => bind(&self.interface, |interface, args| async move {
                let query = query_arg(&args, 0)?;
                RpcResult::Ok(optional_document(interface.find_one(&query).await?))
            }),
            OperationName::FindById => bind(&self.interface, |interface, args| async move {
                let id = args
                    .first()
                    .filter(|id| !matches!(id, Bson::Null))
                    .ok_or_else(|| {
                        InterfaceError::InvalidRequest("findById requires an id".into())
                    })?;
                RpcResult::Ok(optional_document(interface.find_by_id(id).await?))
            }),
            OperationName::Count => bind(&self.interface, |interface, args| async move {
                let query = query_arg(&args, 0)?;
                RpcResult::Ok(count(interface.count(&query).await?))
            }),
            OperationName::Create => bind(&self.interface, |interface, args| async move {
                let fields = document_arg(&args, 0, "fields")?;
                RpcResult::Ok(Bson::Document(interface.create(fields).await?))
            }),
            OperationName::Update => bind(&self.interface, |interface, args| async move {
                let query = query_arg(&args, 0)?;
                let fields = document_arg(&args, 1, "fields")?;
                let upsert = matches!(args.get(2), Some(Bson::Boolean(true)));
                let outcome = interface.update(&query, fields, upsert).await?;
                RpcResult::Ok(count(outcome.affected()))
            }),
            OperationName::Patch => bind(&self.interface, |interface, args| async move {
                let query = query_arg(&args, 0)?;
                let patches = args
                    .get(1)
                    .ok_or_else(|| {
                        InterfaceError::InvalidRequest("patch requires patches".into())
                    })?;
                let patches = parse_patches(patches)?;
                RpcResult::Ok(count(interface.patch(&query, &patches).await?))
            }),
            OperationName::Delete => bind(&self.interface, |interface, args| async move {
                let query = query_arg(&args, 0)?;
                RpcResult::Ok(count(interface.delete(&query).await?))
            }),
        }
    }
}

fn bind<B, F, Fut>(interface: &Arc<SimpleInterface<B>>, call: F) -> RpcHandler
where
    B: StoreBackend + 'static,
    F: Fn(Arc<SimpleInterface<B>>, Vec<Bson>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult> + Send + 'static,
{
    let interface = Arc::clone(interface);
    Arc::new(move |args| call(Arc::clone(&interface), args).boxed())
}

fn query_arg(args: &[Bson], index: usize) -> InterfaceResult<Query> {
    match args.get(index) {
        None | Some(Bson::Null) => Ok(Query::default()),
        Some(Bson::Document(query)) => Query::try_from(query),
        Some(other) => Err(InterfaceError::InvalidRequest(format!(
            "argument {index} must be a query document, got {other}"
        ))),
    }
}

fn document_arg(args: &[Bson], index: usize, name: &str) -> InterfaceResult<Document> {
    match args.get(index) {
        Some(Bson::Document(document)) => Ok(document.clone()),
        Some(other) => Err(InterfaceError::InvalidRequest(format!(
            "{name} must be a document, got {other}"
        ))),
        None => Err(InterfaceError::InvalidRequest(format!("{name} are required"))),
    }
}

fn optional_document(document: Option<Document>) -> Bson {
    document.map(Bson::Document).unwrap_or(Bson::Null)
}

fn count(n: u64) -> Bson {
    i64::try_from(n).map(Bson::Int64).unwrap_or(Bson::Int64(i64::MAX))
}
