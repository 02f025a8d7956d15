//! A protocol-agnostic data-access gateway over document stores.
//!
//! This crate is the core of the docgate project and provides:
//!
//! - **Store backend abstraction** ([`backend`]) - The trait storage backends implement
//! - **Store query AST** ([`query`]) - Filter expressions, sort keys, pagination and projection
//! - **Operation model** ([`operation`]) - Operation names, the generic query, requests and
//!   responses
//! - **Filter translation** ([`filter`]) - Mongo-style filter documents to store queries
//! - **JSON-Patch** ([`patch`]) - RFC 6902 patches over BSON documents
//! - **Data interface** ([`interface`]) - CRUD over one collection
//! - **Simple interface** ([`dispatcher`]) - Plain-data CRUD and the `execute` entry point
//! - **Error handling** ([`error`]) - Store errors and the wrapped interface error
//!
//! # Example
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! let users = SimpleInterface::new(DataInterface::new(InMemoryStore::new(), "users"));
//!
//! let response = users
//!     .execute(OperationRequest::create(doc! { "name": "Ann" }))
//!     .await;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_core;

pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod interface;
pub mod operation;
pub mod patch;
pub mod pojo;
pub mod query;
