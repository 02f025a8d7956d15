//! Convenient re-exports of commonly used types from docgate.
//!
//! ```ignore
//! use docgate::prelude::*;
//! ```
//!
//! This provides access to:
//! - The data interface, the simple interface and their options
//! - The operation model
//! - Store backends and builders
//! - Error types

pub use docgate_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    dispatcher::SimpleInterface,
    error::{DocumentStoreError, DocumentStoreResult, InterfaceError, InterfaceResult, wrap_error},
    interface::{DataInterface, DataInterfaceBuilder, DataInterfaceOptions, UpdateOutcome},
    operation::{OperationName, OperationRequest, OperationResponse, Query, ResponseBody},
    patch::{PatchError, PatchOperation},
    pojo::ToPojo,
};
