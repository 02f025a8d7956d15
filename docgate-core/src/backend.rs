//! Storage backend abstraction consumed by the data interface.
//!
//! The gateway never plans queries, indexes or persists anything itself. It talks to a
//! [`StoreBackend`], which provides CRUD primitives and a query executor over collections of
//! BSON documents. Every document a backend stores carries its identifier in `_id`.
//!
//! # Examples
//!
//! ```ignore
//! use docgate::backend::StoreBackend;
//! use docgate::query::{Filter, StoreQuery};
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//!
//! backend.insert_documents(vec![doc! { "_id": "a1", "name": "Alice" }], "users").await?;
//!
//! let found = backend
//!     .query_documents(StoreQuery::builder().filter(Filter::eq("name", "Alice")).build(), "users")
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::DocumentStoreResult,
    query::{Expr, StoreQuery},
};

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Racing writes on the same document are arbitrated by the backend alone.
///
/// # Ordering
///
/// When a query carries no sort keys the order of results is backend-defined, but it must be
/// stable for an unchanged collection. Ties between equal sort keys are broken the same way.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new documents into a collection.
    ///
    /// Every document must carry an `_id`. If a document with the same `_id` already exists
    /// the backend returns
    /// [`DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists).
    /// The collection is created on first insert.
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Replaces existing documents, matched by their `_id`, entirely.
    async fn update_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Deletes documents by `_id` and returns how many were removed.
    ///
    /// Identifiers that do not exist are skipped.
    async fn delete_documents(&self, ids: Vec<Bson>, collection: &str) -> DocumentStoreResult<u64>;

    /// Queries documents with filter, sort, offset, limit and projection applied by the store.
    ///
    /// A collection that does not exist yields an empty result.
    async fn query_documents(
        &self,
        query: StoreQuery,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Counts the documents matching a filter.
    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<u64>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        (*self)
            .insert_documents(documents, collection)
            .await
    }

    async fn update_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        (*self)
            .update_documents(documents, collection)
            .await
    }

    async fn delete_documents(&self, ids: Vec<Bson>, collection: &str) -> DocumentStoreResult<u64> {
        (*self)
            .delete_documents(ids, collection)
            .await
    }

    async fn query_documents(
        &self,
        query: StoreQuery,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (*self)
            .query_documents(query, collection)
            .await
    }

    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<u64> {
        (*self)
            .count_documents(filter, collection)
            .await
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend + ?Sized,
{
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        (**self)
            .insert_documents(documents, collection)
            .await
    }

    async fn update_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        (**self)
            .update_documents(documents, collection)
            .await
    }

    async fn delete_documents(&self, ids: Vec<Bson>, collection: &str) -> DocumentStoreResult<u64> {
        (**self)
            .delete_documents(ids, collection)
            .await
    }

    async fn query_documents(
        &self,
        query: StoreQuery,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        (**self)
            .query_documents(query, collection)
            .await
    }

    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<u64> {
        (**self)
            .count_documents(filter, collection)
            .await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
