use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::{StreamExt, TryStreamExt, stream::iter};
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, FindOptions},
};

use docgate_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, QueryVisitor, StoreQuery},
};

use crate::{
    query::{MongoQueryTranslator, sort_document},
    sanitizer::ValueSanitizer,
};

/// Duplicate key errors carry this server code in their message.
const DUPLICATE_KEY: &str = "E11000";

fn backend_error(err: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&ValueSanitizer::sanitize_string(collection_name))
    }

    fn prepare_document(&self, document: &Document) -> DocumentStoreResult<Document> {
        if !document.contains_key("_id") {
            return Err(DocumentStoreError::InvalidDocument("document has no _id".into()));
        }

        Ok(ValueSanitizer::sanitize_document(document))
    }

    fn translate_filter(&self, filter: Option<&Expr>) -> DocumentStoreResult<Document> {
        match filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let prepared = documents
            .iter()
            .map(|doc| self.prepare_document(doc))
            .collect::<DocumentStoreResult<Vec<Document>>>()?;

        self.get_collection(collection)
            .insert_many(prepared)
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.contains(DUPLICATE_KEY) {
                    DocumentStoreError::DocumentAlreadyExists(message, collection.to_string())
                } else {
                    backend_error(e)
                }
            })?;

        Ok(())
    }

    async fn update_documents(
        &self,
        documents: Vec<Document>,
        collection: &str,
    ) -> DocumentStoreResult<()> {
        iter(documents)
            .then(async |doc| {
                let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
                let result = self
                    .get_collection(collection)
                    .replace_one(doc! { "_id": id.clone() }, self.prepare_document(&doc)?)
                    .await
                    .map_err(backend_error)?;

                if result.matched_count == 0 {
                    return Err(DocumentStoreError::DocumentNotFound(
                        id.to_string(),
                        collection.to_string(),
                    ));
                }

                Ok(())
            })
            .try_collect::<Vec<_>>()
            .await?;

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Bson>, collection: &str) -> DocumentStoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        Ok(self
            .get_collection(collection)
            .delete_many(doc! { "_id": { "$in": ids } })
            .await
            .map_err(backend_error)?
            .deleted_count)
    }

    async fn query_documents(
        &self,
        query: StoreQuery,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip as u64);
        }
        if !query.sort.is_empty() {
            options.sort = Some(sort_document(&query.sort));
        }
        if let Some(projection) = &query.projection {
            options.projection = Some(projection.to_document());
        }

        Ok(self
            .get_collection(collection)
            .find(self.translate_filter(query.filter.as_ref())?)
            .with_options(options)
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)?
            .iter()
            .map(ValueSanitizer::restore_document)
            .collect())
    }

    async fn count_documents(
        &self,
        filter: Option<Expr>,
        collection: &str,
    ) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(self.translate_filter(filter.as_ref())?)
            .await
            .map_err(backend_error)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown().await
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
