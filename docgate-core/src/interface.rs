//! The data interface: CRUD over one collection of a [`StoreBackend`].
//!
//! A [`DataInterface`] translates generic [`Query`] values into [`StoreQuery`] values, stamps
//! identifiers and timestamps on new documents, applies merge updates and JSON-Patch sequences,
//! and expands references listed in `populate`.
//!
//! # Example
//!
//! ```ignore
//! use docgate::interface::DataInterface;
//! use docgate::memory::InMemoryStore;
//! use bson::doc;
//!
//! let users = DataInterface::builder(InMemoryStore::new(), "users")
//!     .reference("manager", "users")
//!     .build();
//!
//! let created = users.create(doc! { "name": "Ann" }).await?;
//! let found = users.find_by_id(created.get("_id").unwrap()).await?;
//! ```

use std::collections::HashMap;

use bson::{Bson, DateTime, Document};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    backend::StoreBackend,
    error::InterfaceResult,
    filter::{create_query, equality_constraints, parse_filter},
    operation::Query,
    patch::{PatchOperation, apply_patches},
    pojo::{ID_FIELD, to_pojo},
    query::{Filter, Projection, StoreQuery},
};

/// Field stamped with the creation time of a document.
pub const CREATED_AT: &str = "createdAt";
/// Field stamped with the last modification time of a document.
pub const UPDATED_AT: &str = "updatedAt";

/// Behavior switches of a [`DataInterface`].
///
/// Deserializable so it can be read from a configuration file; missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataInterfaceOptions {
    /// Whether `createdAt` and `updatedAt` are maintained.
    pub timestamps: bool,
    /// Reference paths that `populate` can expand, mapped to the collection they point into.
    pub references: HashMap<String, String>,
}

impl Default for DataInterfaceOptions {
    fn default() -> Self {
        Self {
            timestamps: true,
            references: HashMap::new(),
        }
    }
}

/// The outcome of an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Number of existing documents that matched and were rewritten.
    pub matched: u64,
    /// Identifier of the document created by an upsert.
    pub upserted_id: Option<Bson>,
}

impl UpdateOutcome {
    /// Number of documents written, counting an upserted document.
    pub fn affected(&self) -> u64 {
        self.matched + u64::from(self.upserted_id.is_some())
    }
}

/// CRUD access to a single collection.
#[derive(Debug, Clone)]
pub struct DataInterface<B: StoreBackend> {
    backend: B,
    collection: String,
    options: DataInterfaceOptions,
}

impl<B: StoreBackend> DataInterface<B> {
    /// Creates a data interface with default options.
    pub fn new(backend: B, collection: impl Into<String>) -> Self {
        Self::builder(backend, collection).build()
    }

    pub fn builder(backend: B, collection: impl Into<String>) -> DataInterfaceBuilder<B> {
        DataInterfaceBuilder::new(backend, collection)
    }

    /// The collection this interface operates on.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &DataInterfaceOptions {
        &self.options
    }

    /// Translates a generic query into the store query this interface would run.
    pub fn create_query(&self, query: &Query) -> InterfaceResult<StoreQuery> {
        create_query(query)
    }

    /// Returns every document matching `query`, after sort, skip, limit and projection.
    pub async fn find(&self, query: &Query) -> InterfaceResult<Vec<Document>> {
        let store_query = self.create_query(query)?;
        let mut documents = self
            .backend
            .query_documents(store_query, &self.collection)
            .await?;

        self.populate(&mut documents, &query.populate).await?;

        Ok(documents)
    }

    /// Returns the first document matching `query`, if any.
    pub async fn find_one(&self, query: &Query) -> InterfaceResult<Option<Document>> {
        let mut store_query = self.create_query(query)?;
        store_query.limit = Some(1);

        let mut documents = self
            .backend
            .query_documents(store_query, &self.collection)
            .await?;

        self.populate(&mut documents, &query.populate).await?;

        Ok(documents.into_iter().next())
    }

    /// Returns the document whose `_id` equals `id`, if any.
    pub async fn find_by_id(&self, id: &Bson) -> InterfaceResult<Option<Document>> {
        let store_query = StoreQuery::builder()
            .filter(Filter::eq(ID_FIELD, id.clone()))
            .limit(1)
            .build();

        Ok(self
            .backend
            .query_documents(store_query, &self.collection)
            .await?
            .into_iter()
            .next())
    }

    /// Counts the documents matching the filter of `query`. Pagination is ignored.
    pub async fn count(&self, query: &Query) -> InterfaceResult<u64> {
        let filter = parse_filter(&query.query)?;

        Ok(self
            .backend
            .count_documents(filter, &self.collection)
            .await?)
    }

    /// Persists a new document built from `fields` and returns it as stored.
    ///
    /// An `_id` is generated when `fields` has none. With timestamps enabled, `createdAt` and
    /// `updatedAt` are set to the current time unless supplied.
    ///
    /// # Errors
    ///
    /// Fails with a store error when a document with the same `_id` already exists.
    pub async fn create(&self, fields: Document) -> InterfaceResult<Document> {
        let mut document = Document::new();
        let id = fields
            .get(ID_FIELD)
            .cloned()
            .unwrap_or_else(|| Bson::String(Uuid::new_v4().to_string()));
        document.insert(ID_FIELD, id);

        for (key, value) in fields {
            if key != ID_FIELD {
                document.insert(key, value);
            }
        }

        if self.options.timestamps {
            let now = DateTime::now();
            if !document.contains_key(CREATED_AT) {
                document.insert(CREATED_AT, now);
            }
            if !document.contains_key(UPDATED_AT) {
                document.insert(UPDATED_AT, now);
            }
        }

        self.backend
            .insert_documents(vec![document.clone()], &self.collection)
            .await?;

        debug!(collection = %self.collection, id = ?document.get(ID_FIELD), "created document");

        Ok(document)
    }

    /// Merges `fields` into every document matching `query`.
    ///
    /// `_id` is never rewritten. When nothing matches and `upsert` is set, a new document is
    /// created from the equality constraints of the filter overlaid with `fields`. The check and
    /// the insert are not atomic.
    pub async fn update(
        &self,
        query: &Query,
        fields: Document,
        upsert: bool,
    ) -> InterfaceResult<UpdateOutcome> {
        let matched = self.matching_documents(query).await?;

        if matched.is_empty() {
            if !upsert {
                return Ok(UpdateOutcome::default());
            }

            let mut seed = equality_constraints(&query.query);
            for (key, value) in fields {
                if key != ID_FIELD {
                    seed.insert(key, value);
                }
            }

            let created = self.create(seed).await?;
            debug!(collection = %self.collection, "upserted document");

            return Ok(UpdateOutcome {
                matched: 0,
                upserted_id: created.get(ID_FIELD).cloned(),
            });
        }

        let now = DateTime::now();
        let updated: Vec<Document> = matched
            .into_iter()
            .map(|mut document| {
                for (key, value) in &fields {
                    if key != ID_FIELD {
                        document.insert(key.clone(), value.clone());
                    }
                }
                if self.options.timestamps {
                    document.insert(UPDATED_AT, now);
                }
                document
            })
            .collect();

        let outcome = UpdateOutcome {
            matched: updated.len() as u64,
            upserted_id: None,
        };

        self.backend
            .update_documents(updated, &self.collection)
            .await?;

        Ok(outcome)
    }

    /// Applies `patches` to every document matching `query` and returns how many were patched.
    ///
    /// Each document is patched and written on its own. When a patch fails for one document the
    /// error is returned and documents written before it keep their changes.
    pub async fn patch(&self, query: &Query, patches: &[PatchOperation]) -> InterfaceResult<u64> {
        let matched = self.matching_documents(query).await?;
        let mut patched = 0;

        for document in matched {
            let mut document = apply_patches(&document, patches)?;
            if self.options.timestamps {
                document.insert(UPDATED_AT, DateTime::now());
            }

            self.backend
                .update_documents(vec![document], &self.collection)
                .await?;
            patched += 1;
        }

        Ok(patched)
    }

    /// Deletes every document matching `query` and returns how many were removed.
    pub async fn delete(&self, query: &Query) -> InterfaceResult<u64> {
        let store_query = StoreQuery {
            filter: parse_filter(&query.query)?,
            projection: Some(Projection::Include { fields: Vec::new(), id: true }),
            ..StoreQuery::default()
        };

        let ids: Vec<Bson> = self
            .backend
            .query_documents(store_query, &self.collection)
            .await?
            .into_iter()
            .filter_map(|mut document| document.remove(ID_FIELD))
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        Ok(self
            .backend
            .delete_documents(ids, &self.collection)
            .await?)
    }

    /// Every document matching the filter of `query`, ignoring pagination and projection.
    async fn matching_documents(&self, query: &Query) -> InterfaceResult<Vec<Document>> {
        let store_query = StoreQuery {
            filter: parse_filter(&query.query)?,
            ..StoreQuery::default()
        };

        Ok(self
            .backend
            .query_documents(store_query, &self.collection)
            .await?)
    }

    /// Replaces reference identifiers at each path in `paths` by the documents they point to.
    ///
    /// Paths without a configured reference are left as they are. A single reference that
    /// resolves to nothing becomes `null`, and unresolved entries of a reference array are dropped.
    /// Spliced documents are in plain-data form, carrying the `id` alias.
    async fn populate(&self, documents: &mut [Document], paths: &[String]) -> InterfaceResult<()> {
        for path in paths {
            let Some(target) = self.options.references.get(path) else {
                debug!(
                    collection = %self.collection,
                    path = %path,
                    "no reference configured for populate path"
                );
                continue;
            };

            let mut ids = Vec::new();
            for document in documents.iter() {
                match document.get(path) {
                    Some(Bson::Array(values)) => ids.extend(values.iter().cloned()),
                    Some(Bson::Null) | None => {}
                    Some(value) => ids.push(value.clone()),
                }
            }

            if ids.is_empty() {
                continue;
            }

            let store_query = StoreQuery::builder()
                .filter(Filter::any_of(ID_FIELD, Bson::Array(ids)))
                .build();
            let related = self.backend.query_documents(store_query, target).await?;
            let lookup = |id: &Bson| {
                related
                    .iter()
                    .find(|document| document.get(ID_FIELD) == Some(id))
                    .map(to_pojo)
            };

            for document in documents.iter_mut() {
                let replacement = match document.get(path) {
                    Some(Bson::Array(values)) => Bson::Array(
                        values
                            .iter()
                            .filter_map(|id| lookup(id).map(Bson::Document))
                            .collect(),
                    ),
                    Some(Bson::Null) | None => continue,
                    Some(id) => lookup(id).map(Bson::Document).unwrap_or(Bson::Null),
                };
                document.insert(path.clone(), replacement);
            }
        }

        Ok(())
    }
}

/// Builder for [`DataInterface`].
#[derive(Debug)]
pub struct DataInterfaceBuilder<B: StoreBackend> {
    backend: B,
    collection: String,
    options: DataInterfaceOptions,
}

impl<B: StoreBackend> DataInterfaceBuilder<B> {
    pub fn new(backend: B, collection: impl Into<String>) -> Self {
        Self {
            backend,
            collection: collection.into(),
            options: DataInterfaceOptions::default(),
        }
    }

    /// Enables or disables `createdAt`/`updatedAt` maintenance. Enabled by default.
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.options.timestamps = enabled;
        self
    }

    /// Declares that `path` holds identifiers of documents in `collection`.
    pub fn reference(mut self, path: impl Into<String>, collection: impl Into<String>) -> Self {
        self.options.references.insert(path.into(), collection.into());
        self
    }

    /// Replaces all options at once.
    pub fn options(mut self, options: DataInterfaceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> DataInterface<B> {
        DataInterface {
            backend: self.backend,
            collection: self.collection,
            options: self.options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_fill_in_defaults() {
        let options: DataInterfaceOptions =
            serde_json::from_str(r#"{ "references": { "owner": "users" } }"#).unwrap();

        assert!(options.timestamps);
        assert_eq!(options.references.get("owner").map(String::as_str), Some("users"));
    }
}
