//! Main docgate crate: a protocol-agnostic gateway over document collections.
//!
//! One collection is wrapped in a [`DataInterface`](interface::DataInterface), exposed as plain
//! data through a [`SimpleInterface`](dispatcher::SimpleInterface), and served by protocol
//! adapters that all go through the same `execute` entry point:
//!
//! - [`rest`] maps HTTP verbs, paths and query strings onto operations
//! - [`rpc`] registers each operation as a named method
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use axum::Router;
//! use docgate::{prelude::*, memory::InMemoryStore, rest::RestAdapter};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let pets = SimpleInterface::new(
//!         DataInterface::builder(InMemoryStore::new(), "pets")
//!             .reference("owner", "users")
//!             .build(),
//!     );
//!
//!     pets.create(doc! { "name": "Rex" }).await.unwrap();
//!
//!     let app = Router::new().nest("/pets", Arc::new(RestAdapter::new(pets)).router());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! # Operations
//!
//! `find`, `findOne`, `findById`, `count`, `create`, `update`, `patch` and `delete`. Queries use
//! Mongo-style filter documents with `sort`, `skip`, `limit`, `project` and `populate`.
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docgate_core::{
    backend, dispatcher, error, filter, interface, operation, patch, pojo, query,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docgate_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// REST protocol adapter.
pub mod rest {
    pub use docgate_rest::codec;
    pub use docgate_rest::{
        Codec, CodecError, DefaultCodec, ParseOptions, RestAdapter, RestAdapterBuilder, RestOptions,
        SerializationFormat, X_COUNT, interface_request_from_http_request,
    };
}

/// RPC protocol adapter.
pub mod rpc {
    pub use docgate_rpc::{MethodRegistry, MethodTable, RpcAdapter, RpcHandler, RpcResult};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docgate_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
