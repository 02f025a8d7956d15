//! RPC adapter for docgate.
//!
//! Registers each operation of a [`SimpleInterface`](docgate_core::dispatcher::SimpleInterface)
//! as its own named method. Arguments are positional and results are plain data.
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use docgate::{prelude::*, memory::InMemoryStore, rpc::{MethodTable, RpcAdapter}};
//!
//! let pets = Arc::new(SimpleInterface::new(DataInterface::new(InMemoryStore::new(), "pets")));
//! let mut table = MethodTable::new();
//! RpcAdapter::new(pets, "api.").register(&mut table);
//!
//! let all = table.call("api.pets:find", vec![]).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_rpc;

pub mod adapter;
pub mod registry;

pub use adapter::RpcAdapter;
pub use registry::{MethodRegistry, MethodTable, RpcHandler, RpcResult};
