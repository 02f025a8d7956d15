//! The simple interface: plain-data CRUD plus the single `execute` entry point adapters use.
//!
//! [`SimpleInterface`] wraps a [`DataInterface`], converts every document it returns into plain
//! data (see [`pojo`](crate::pojo)) and turns any failure into a wrapped [`InterfaceError`].
//! [`SimpleInterface::execute`] routes an [`OperationRequest`] to the matching method and never
//! fails: errors come back inside the [`OperationResponse`].

use bson::{Bson, Document};
use tracing::{debug, warn};

use crate::{
    backend::StoreBackend,
    error::{InterfaceError, InterfaceResult, wrap_error},
    interface::{DataInterface, UpdateOutcome},
    operation::{OperationName, OperationRequest, OperationResponse, Query, ResponseBody},
    patch::{PatchOperation, parse_patches},
    pojo::{ID_ALIAS, ID_FIELD, ToPojo},
};

/// Plain-data facade over a [`DataInterface`].
#[derive(Debug, Clone)]
pub struct SimpleInterface<B: StoreBackend> {
    data: DataInterface<B>,
}

impl<B: StoreBackend> SimpleInterface<B> {
    pub fn new(data: DataInterface<B>) -> Self {
        Self { data }
    }

    /// The wrapped data interface.
    pub fn data_interface(&self) -> &DataInterface<B> {
        &self.data
    }

    /// Name of the collection, used by adapters as the model name.
    pub fn model_name(&self) -> &str {
        self.data.collection()
    }

    pub async fn find(&self, query: &Query) -> InterfaceResult<Vec<Document>> {
        let documents = self.data.find(query).await?;
        Ok(documents.as_slice().to_pojo())
    }

    pub async fn find_one(&self, query: &Query) -> InterfaceResult<Option<Document>> {
        Ok(self.data.find_one(query).await?.to_pojo())
    }

    pub async fn find_by_id(&self, id: &Bson) -> InterfaceResult<Option<Document>> {
        Ok(self.data.find_by_id(id).await?.to_pojo())
    }

    pub async fn count(&self, query: &Query) -> InterfaceResult<u64> {
        self.data.count(query).await
    }

    pub async fn create(&self, fields: Document) -> InterfaceResult<Document> {
        Ok(self.data.create(fields).await?.to_pojo())
    }

    pub async fn update(
        &self,
        query: &Query,
        fields: Document,
        upsert: bool,
    ) -> InterfaceResult<UpdateOutcome> {
        self.data.update(query, fields, upsert).await
    }

    pub async fn patch(&self, query: &Query, patches: &[PatchOperation]) -> InterfaceResult<u64> {
        self.data.patch(query, patches).await
    }

    pub async fn delete(&self, query: &Query) -> InterfaceResult<u64> {
        self.data.delete(query).await
    }

    /// Runs a normalized request and reports the outcome, success or failure, as a response.
    pub async fn execute(&self, request: OperationRequest) -> OperationResponse {
        let method = request.method;
        debug!(collection = %self.model_name(), %method, "executing operation");

        let body = match self.dispatch(method, &request.body).await {
            Ok(body) => body,
            Err(err) => {
                let err = wrap_error(err);
                warn!(
                    collection = %self.model_name(),
                    %method,
                    kind = err.kind(),
                    http_code = err.http_code(),
                    error = %err,
                    "operation failed"
                );
                ResponseBody::Error(err)
            }
        };

        OperationResponse::new(Some(method), body)
    }

    async fn dispatch(
        &self,
        method: OperationName,
        body: &Document,
    ) -> InterfaceResult<ResponseBody> {
        match method {
            OperationName::Find => {
                let query = query_from(body)?;
                Ok(ResponseBody::Results(self.find(&query).await?))
            }
            OperationName::FindOne => {
                let query = query_from(body)?;
                Ok(ResponseBody::Result(self.find_one(&query).await?))
            }
            OperationName::FindById => {
                let id = id_from(body)?;
                Ok(ResponseBody::Result(self.find_by_id(&id).await?))
            }
            OperationName::Count => {
                let query = query_from(body)?;
                Ok(ResponseBody::Count(self.count(&query).await?))
            }
            OperationName::Create => {
                let fields = fields_from(body)?;
                let created = self.create(fields).await?;
                Ok(ResponseBody::Id(created.get(ID_FIELD).cloned().unwrap_or(Bson::Null)))
            }
            OperationName::Update => {
                let query = query_from(body)?;
                let fields = fields_from(body)?;
                let upsert = upsert_from(body);
                let outcome = self.update(&query, fields, upsert).await?;
                debug!(
                    matched = outcome.matched,
                    upserted = outcome.upserted_id.is_some(),
                    "updated"
                );
                Ok(ResponseBody::Empty)
            }
            OperationName::Patch => {
                let query = query_from(body)?;
                let patches = body
                    .get("patches")
                    .ok_or_else(|| {
                        InterfaceError::InvalidRequest("patch requires patches".into())
                    })?;
                let patches = parse_patches(patches)?;
                self.patch(&query, &patches).await?;
                Ok(ResponseBody::Empty)
            }
            OperationName::Delete => {
                let query = query_from(body)?;
                self.delete(&query).await?;
                Ok(ResponseBody::Empty)
            }
        }
    }
}

fn query_from(body: &Document) -> InterfaceResult<Query> {
    match body.get("query") {
        None | Some(Bson::Null) => Ok(Query::default()),
        Some(Bson::Document(query)) => Query::try_from(query),
        Some(other) => Err(InterfaceError::InvalidRequest(format!(
            "query must be a document, got {other}"
        ))),
    }
}

fn fields_from(body: &Document) -> InterfaceResult<Document> {
    match body.get("fields") {
        Some(Bson::Document(fields)) => Ok(fields.clone()),
        Some(other) => Err(InterfaceError::InvalidRequest(format!(
            "fields must be a document, got {other}"
        ))),
        None => Err(InterfaceError::InvalidRequest("fields are required".into())),
    }
}

/// `findById` takes `{ id }`, or falls back to `_id`/`id` in the query filter.
fn id_from(body: &Document) -> InterfaceResult<Bson> {
    if let Some(id) = body.get(ID_ALIAS).filter(|id| !matches!(id, Bson::Null)) {
        return Ok(id.clone());
    }

    let query = query_from(body)?;
    query
        .query
        .get(ID_FIELD)
        .or_else(|| query.query.get(ID_ALIAS))
        .cloned()
        .ok_or_else(|| InterfaceError::InvalidRequest("findById requires an id".into()))
}

/// `upsert` may sit on the payload or, when it arrives through a query string, in the query.
fn upsert_from(body: &Document) -> bool {
    let flag = body.get("upsert").or_else(|| {
        body.get_document("query")
            .ok()
            .and_then(|query| query.get("upsert"))
    });

    match flag {
        Some(Bson::Boolean(upsert)) => *upsert,
        Some(Bson::String(upsert)) => upsert == "true",
        Some(Bson::Int32(upsert)) => *upsert != 0,
        Some(Bson::Int64(upsert)) => *upsert != 0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn id_is_read_from_payload_or_filter() {
        assert_eq!(id_from(&doc! { "id": "a" }).unwrap(), Bson::from("a"));
        assert_eq!(
            id_from(&doc! { "query": { "query": { "_id": "b" } } }).unwrap(),
            Bson::from("b")
        );
        assert_eq!(id_from(&doc! {}).unwrap_err().kind(), "InvalidRequest");
    }

    #[test]
    fn upsert_accepts_query_string_form() {
        assert!(upsert_from(&doc! { "upsert": true }));
        assert!(upsert_from(&doc! { "query": { "upsert": "true" } }));
        assert!(!upsert_from(&doc! { "query": {} }));
    }

    #[test]
    fn create_requires_fields() {
        assert_eq!(fields_from(&doc! {}).unwrap_err().kind(), "InvalidRequest");
        assert!(fields_from(&doc! { "fields": 3 }).is_err());
    }
}
