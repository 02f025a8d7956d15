//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory backend that keeps every collection as BSON
//! documents behind an async-safe read-write lock. Documents are returned in insertion order
//! unless a query sorts them.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use bson::{Bson, Document};
use mea::rwlock::RwLock;

use docgate_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, StoreQuery},
};

use crate::evaluator::{DocumentEvaluator, compare_documents};

/// One collection: documents keyed by insertion sequence, plus an index from `_id` to sequence.
#[derive(Debug, Default)]
struct CollectionData {
    documents: BTreeMap<u64, Document>,
    ids: HashMap<String, u64>,
    next_sequence: u64,
}

impl CollectionData {
    fn insert(&mut self, key: String, document: Document) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.ids.insert(key, sequence);
        self.documents.insert(sequence, document);
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Document> {
        let sequence = self.ids.get(key)?;
        self.documents.get_mut(sequence)
    }

    fn remove(&mut self, key: &str) -> Option<Document> {
        let sequence = self.ids.remove(key)?;
        self.documents.remove(&sequence)
    }

    fn matching<'a>(&'a self, filter: Option<&Expr>) -> DocumentStoreResult<Vec<&'a Document>> {
        match filter {
            Some(filter) => DocumentEvaluator::filter_documents(self.documents.values(), filter),
            None => Ok(self.documents.values().collect()),
        }
    }
}

type StoreMap = HashMap<String, CollectionData>;

/// Key identifying a document within a collection.
///
/// Numbers of different widths map to the same key, strings are kept apart from numbers.
fn id_key(id: &Bson) -> String {
    match id {
        Bson::String(id) => format!("s:{id}"),
        Bson::ObjectId(id) => format!("o:{}", id.to_hex()),
        Bson::Int32(id) => format!("n:{id}"),
        Bson::Int64(id) => format!("n:{id}"),
        other => format!("v:{other}"),
    }
}

fn document_key(document: &Document, collection: &str) -> DocumentStoreResult<String> {
    document
        .get("_id")
        .map(id_key)
        .ok_or_else(|| {
            DocumentStoreError::InvalidDocument(format!("document in {collection} has no _id"))
        })
}

/// Thread-safe in-memory document storage backend.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). For small to medium
/// datasets this is typically acceptable. For larger datasets,
/// consider using a persistent backend like MongoDB.
///
/// # Example
///
/// ```ignore
/// use docgate_memory::InMemoryStore;
/// use docgate::backend::StoreBackend;
/// use docgate::query::StoreQuery;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.insert_documents(vec![doc! { "_id": "a1", "name": "Alice" }], "users").await?;
///
///     let docs = store.query_documents(StoreQuery::new(), "users").await?;
///     assert_eq!(docs.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// The main storage map: collection_name -> documents
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docgate_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().build().await.unwrap();
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Lists the collections that currently hold at least one insert.
    pub async fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.store.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_data = store.entry(collection.to_string()).or_default();

        // Validate the whole batch before writing so a conflict leaves the collection unchanged.
        let mut keys = Vec::with_capacity(documents.len());
        for document in &documents {
            let key = document_key(document, collection)?;

            if collection_data.ids.contains_key(&key) || keys.contains(&key) {
                let id = document.get("_id").map(ToString::to_string).unwrap_or_default();
                return Err(DocumentStoreError::DocumentAlreadyExists(id, collection.to_string()));
            }

            keys.push(key);
        }

        for (key, document) in keys.into_iter().zip(documents) {
            collection_data.insert(key, document);
        }

        Ok(())
    }

    async fn update_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let collection_data = match store.get_mut(collection) {
            Some(col) => col,
            None => return Err(DocumentStoreError::CollectionNotFound(collection.to_string())),
        };

        for document in documents {
            let key = document_key(&document, collection)?;

            match collection_data.get_mut(&key) {
                Some(stored) => *stored = document,
                None => {
                    let id = document.get("_id").map(ToString::to_string).unwrap_or_default();
                    return Err(DocumentStoreError::DocumentNotFound(id, collection.to_string()));
                }
            }
        }

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Bson>, collection: &str) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let collection_data = match store.get_mut(collection) {
            Some(col) => col,
            None => return Ok(0),
        };

        let mut deleted = 0;
        for id in ids {
            if collection_data.remove(&id_key(&id)).is_some() {
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    async fn query_documents(
        &self,
        query: StoreQuery,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let collection_data = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        let mut documents = collection_data.matching(query.filter.as_ref())?;

        // Stable sort keeps insertion order between equal keys
        if !query.sort.is_empty() {
            documents.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        Ok(documents
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|document| match &query.projection {
                Some(projection) => projection.apply(document),
                None => document.clone(),
            })
            .collect())
    }

    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;

        match store.get(collection) {
            Some(collection_data) => Ok(collection_data.matching(filter.as_ref())?.len() as u64),
            None => Ok(0),
        }
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// Optionally seeds collections with documents, which is handy for fixtures.
///
/// # Example
///
/// ```ignore
/// use docgate_memory::InMemoryStore;
/// use docgate::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder()
///     .seed("users", vec![doc! { "_id": "a", "name": "Ann" }])
///     .build()
///     .await?;
/// ```
#[derive(Default, Debug)]
pub struct InMemoryStoreBuilder {
    seeds: Vec<(String, Vec<Document>)>,
}

impl InMemoryStoreBuilder {
    /// Adds documents to insert into `collection` when the store is built.
    pub fn seed(mut self, collection: impl Into<String>, documents: Vec<Document>) -> Self {
        self.seeds.push((collection.into(), documents));
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds a new [`InMemoryStore`] and inserts any seeded documents.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let store = InMemoryStore::new();

        for (collection, documents) in self.seeds {
            store.insert_documents(documents, &collection).await?;
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use docgate_core::query::{Filter, Projection, SortDirection};

    use super::*;

    async fn seeded() -> InMemoryStore {
        InMemoryStore::builder()
            .seed(
                "pets",
                vec![
                    doc! { "_id": "c", "name": "Rex", "age": 3, "kind": "dog" },
                    doc! { "_id": "a", "name": "Tom", "age": 5, "kind": "cat" },
                    doc! { "_id": "b", "name": "Kit", "age": 3, "kind": "cat" },
                ],
            )
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = seeded().await;

        let err = store
            .insert_documents(vec![doc! { "_id": "a" }], "pets")
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::DocumentAlreadyExists(_, _)));
        assert_eq!(store.count_documents(None, "pets").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn insert_requires_an_id() {
        let store = InMemoryStore::new();
        let err = store.insert_documents(vec![doc! { "name": "x" }], "pets").await.unwrap_err();

        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn unsorted_queries_keep_insertion_order() {
        let store = seeded().await;
        let documents = store.query_documents(StoreQuery::new(), "pets").await.unwrap();

        let ids: Vec<_> = documents.iter().map(|d| d.get_str("_id").unwrap()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn multi_key_sort_with_pagination() {
        let store = seeded().await;
        let query = StoreQuery::builder()
            .sort("age", SortDirection::Asc)
            .sort("name", SortDirection::Desc)
            .offset(1)
            .limit(2)
            .build();

        let documents = store.query_documents(query, "pets").await.unwrap();
        let names: Vec<_> = documents.iter().map(|d| d.get_str("name").unwrap()).collect();

        assert_eq!(names, vec!["Kit", "Tom"]);
    }

    #[tokio::test]
    async fn projection_and_count() {
        let store = seeded().await;
        let query = StoreQuery::builder()
            .filter(Filter::eq("kind", "cat"))
            .projection(Projection::Include { fields: vec!["name".into()], id: false })
            .build();

        let documents = store.query_documents(query, "pets").await.unwrap();
        assert_eq!(documents, vec![doc! { "name": "Tom" }, doc! { "name": "Kit" }]);

        let count = store
            .count_documents(Some(Filter::eq("kind", "cat")), "pets")
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn update_and_delete_by_id() {
        let store = seeded().await;

        store
            .update_documents(vec![doc! { "_id": "a", "name": "Tim" }], "pets")
            .await
            .unwrap();
        let deleted = store
            .delete_documents(vec![Bson::from("b"), Bson::from("zz")], "pets")
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        let documents = store.query_documents(StoreQuery::new(), "pets").await.unwrap();
        assert_eq!(documents[1], doc! { "_id": "a", "name": "Tim" });
        assert_eq!(documents.len(), 2);
    }

    #[tokio::test]
    async fn missing_collections_are_empty() {
        let store = InMemoryStore::new();

        assert!(store.query_documents(StoreQuery::new(), "nope").await.unwrap().is_empty());
        assert_eq!(store.delete_documents(vec![Bson::from("a")], "nope").await.unwrap(), 0);
        assert!(store.list_collections().await.is_empty());
    }
}
