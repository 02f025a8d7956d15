//! REST adapter for docgate.
//!
//! Maps HTTP verbs, paths, query strings and bodies onto operation requests, runs them through a
//! [`SimpleInterface`](docgate_core::dispatcher::SimpleInterface), and renders the outcome with
//! the right status, headers and body.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use axum::Router;
//! use docgate::{prelude::*, memory::InMemoryStore, rest::RestAdapter};
//!
//! let pets = SimpleInterface::new(DataInterface::new(InMemoryStore::new(), "pets"));
//! let app = Router::new().nest("/pets", Arc::new(RestAdapter::new(pets)).router());
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_rest;

pub mod adapter;
pub mod codec;
pub mod options;
pub mod request;

pub use adapter::{RestAdapter, RestAdapterBuilder, X_COUNT};
pub use codec::{Codec, CodecError, DefaultCodec, SerializationFormat};
pub use options::{ParseOptions, RestOptions};
pub use request::interface_request_from_http_request;
