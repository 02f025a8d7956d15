//! In-memory document storage backend for docgate.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Full query support** - Filtering with dotted paths, multi-key sorting, pagination and
//!   projection
//! - **Deterministic order** - Unsorted results come back in insertion order
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let users = SimpleInterface::new(DataInterface::new(InMemoryStore::new(), "users"));
//!
//!     let created = users.create(doc! { "name": "Alice" }).await.unwrap();
//!     println!("created {created}");
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_memory;

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
