//! The operation vocabulary shared by every protocol adapter.
//!
//! An [`OperationRequest`] names one of the eight [`OperationName`]s and carries an
//! operation-specific payload document:
//!
//! | operation                     | payload                                  |
//! |-------------------------------|------------------------------------------|
//! | `find`, `findOne`, `count`    | `{ query: Query }`                       |
//! | `findById`                    | `{ id }` or `{ query: { query: { _id } } }` |
//! | `create`                      | `{ fields }`                             |
//! | `update`                      | `{ query, fields, upsert? }`             |
//! | `patch`                       | `{ query, patches: [...] }`              |
//! | `delete`                      | `{ query }`                              |
//!
//! The dispatcher answers with an [`OperationResponse`] whose [`ResponseBody`] holds a single
//! result, a list of results, a count, a created identifier, nothing, or an error.

use std::{fmt, str::FromStr};

use bson::{Bson, Document, doc};

use crate::error::{InterfaceError, InterfaceResult};

/// One of the data operations the gateway exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationName {
    Find,
    FindOne,
    FindById,
    Count,
    Create,
    Update,
    Patch,
    Delete,
}

impl OperationName {
    /// Every operation, in declaration order.
    pub const ALL: [OperationName; 8] = [
        OperationName::Find,
        OperationName::FindOne,
        OperationName::FindById,
        OperationName::Count,
        OperationName::Create,
        OperationName::Update,
        OperationName::Patch,
        OperationName::Delete,
    ];

    /// Returns the wire name of the operation (`find`, `findOne`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationName::Find => "find",
            OperationName::FindOne => "findOne",
            OperationName::FindById => "findById",
            OperationName::Count => "count",
            OperationName::Create => "create",
            OperationName::Update => "update",
            OperationName::Patch => "patch",
            OperationName::Delete => "delete",
        }
    }

    /// Whether the operation answers with at most one document.
    pub fn is_single_result(&self) -> bool {
        matches!(self, OperationName::FindOne | OperationName::FindById)
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationName {
    type Err = InterfaceError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        OperationName::ALL
            .into_iter()
            .find(|operation| operation.as_str() == name)
            .ok_or_else(|| InterfaceError::UnknownOperation(name.to_string()))
    }
}

/// The generic, storage-independent query shape.
///
/// `query` is a Mongo-style filter document and is always present, possibly empty. `sort`
/// maps fields to directions in priority order; `skip` and `limit` apply after sorting.
/// A `limit` of zero means no limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Filter document.
    pub query: Document,
    /// Ordered field to direction mapping.
    pub sort: Option<Document>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Paths of related fields to expand.
    pub populate: Vec<String>,
    /// Field inclusion/exclusion map.
    pub project: Option<Document>,
}

impl Query {
    /// Creates a query with the given filter and nothing else.
    pub fn filter(query: Document) -> Self {
        Self { query, ..Self::default() }
    }

    /// Renders the query back into its payload document form.
    pub fn to_document(&self) -> Document {
        let mut document = doc! { "query": self.query.clone() };

        if let Some(sort) = &self.sort {
            document.insert("sort", sort.clone());
        }
        if let Some(skip) = self.skip {
            document.insert("skip", to_bson_count(skip));
        }
        if let Some(limit) = self.limit {
            document.insert("limit", to_bson_count(limit));
        }
        if !self.populate.is_empty() {
            document.insert("populate", self.populate.join(" "));
        }
        if let Some(project) = &self.project {
            document.insert("project", project.clone());
        }

        document
    }
}

impl TryFrom<&Document> for Query {
    type Error = InterfaceError;

    fn try_from(document: &Document) -> InterfaceResult<Self> {
        let query = match document.get("query") {
            None | Some(Bson::Null) => Document::new(),
            Some(Bson::Document(filter)) => filter.clone(),
            Some(other) => {
                return Err(InterfaceError::InvalidQuery(format!(
                    "query must be a document, got {other}"
                )));
            }
        };

        let sort = match document.get("sort") {
            None | Some(Bson::Null) => None,
            Some(Bson::Document(sort)) => Some(sort.clone()),
            Some(Bson::String(spec)) => Some(parse_sort_string(spec)),
            Some(other) => {
                return Err(InterfaceError::InvalidQuery(format!(
                    "sort must be a document or a string, got {other}"
                )));
            }
        };

        let populate = match document.get("populate") {
            None | Some(Bson::Null) => Vec::new(),
            Some(Bson::String(paths)) => split_paths(paths),
            Some(Bson::Array(paths)) => paths
                .iter()
                .map(|path| match path {
                    Bson::String(path) => Ok(path.clone()),
                    other => Err(InterfaceError::InvalidQuery(format!(
                        "populate entries must be strings, got {other}"
                    ))),
                })
                .collect::<InterfaceResult<Vec<_>>>()?,
            Some(other) => {
                return Err(InterfaceError::InvalidQuery(format!(
                    "populate must be a string or an array, got {other}"
                )));
            }
        };

        let project = match document.get("project") {
            None | Some(Bson::Null) => None,
            Some(Bson::Document(project)) => Some(project.clone()),
            Some(other) => {
                return Err(InterfaceError::InvalidQuery(format!(
                    "project must be a document, got {other}"
                )));
            }
        };

        Ok(Query {
            query,
            sort,
            skip: count_field(document, "skip")?,
            limit: count_field(document, "limit")?,
            populate,
            project,
        })
    }
}

impl TryFrom<Document> for Query {
    type Error = InterfaceError;

    fn try_from(document: Document) -> InterfaceResult<Self> {
        Query::try_from(&document)
    }
}

/// `"name -age"` becomes `{ name: 1, age: -1 }`.
fn parse_sort_string(spec: &str) -> Document {
    split_paths(spec)
        .into_iter()
        .map(|field| match field.strip_prefix('-') {
            Some(field) => (field.to_string(), Bson::Int32(-1)),
            None => (field.trim_start_matches('+').to_string(), Bson::Int32(1)),
        })
        .collect()
}

fn split_paths(paths: &str) -> Vec<String> {
    paths
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}

fn count_field(document: &Document, name: &str) -> InterfaceResult<Option<u64>> {
    let invalid = |value: &Bson| {
        InterfaceError::InvalidQuery(format!("{name} must be a non-negative integer, got {value}"))
    };

    match document.get(name) {
        None | Some(Bson::Null) => Ok(None),
        Some(value @ Bson::Int32(n)) => u64::try_from(*n).map(Some).map_err(|_| invalid(value)),
        Some(value @ Bson::Int64(n)) => u64::try_from(*n).map(Some).map_err(|_| invalid(value)),
        Some(value @ Bson::Double(n)) if n.fract() == 0.0 && *n >= 0.0 => {
            u64::try_from(*n as i64).map(Some).map_err(|_| invalid(value))
        }
        Some(value @ Bson::String(s)) => {
            s.trim().parse::<u64>().map(Some).map_err(|_| invalid(value))
        }
        Some(value) => Err(invalid(value)),
    }
}

fn to_bson_count(count: u64) -> Bson {
    i64::try_from(count).map(Bson::Int64).unwrap_or(Bson::Int64(i64::MAX))
}

/// A normalized operation request.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    /// The operation to run.
    pub method: OperationName,
    /// The operation-specific payload.
    pub body: Document,
}

impl OperationRequest {
    pub fn new(method: OperationName, body: Document) -> Self {
        Self { method, body }
    }

    /// `find` with the given query.
    pub fn find(query: &Query) -> Self {
        Self::new(OperationName::Find, doc! { "query": query.to_document() })
    }

    /// `findOne` with the given query.
    pub fn find_one(query: &Query) -> Self {
        Self::new(OperationName::FindOne, doc! { "query": query.to_document() })
    }

    /// `findById` for the given identifier.
    pub fn find_by_id(id: impl Into<Bson>) -> Self {
        Self::new(OperationName::FindById, doc! { "id": id.into() })
    }

    /// `count` with the given query.
    pub fn count(query: &Query) -> Self {
        Self::new(OperationName::Count, doc! { "query": query.to_document() })
    }

    /// `create` with the given fields.
    pub fn create(fields: Document) -> Self {
        Self::new(OperationName::Create, doc! { "fields": fields })
    }

    /// `update` of every document matching `query`.
    pub fn update(query: &Query, fields: Document, upsert: bool) -> Self {
        Self::new(
            OperationName::Update,
            doc! { "query": query.to_document(), "fields": fields, "upsert": upsert },
        )
    }

    /// `patch` of every document matching `query` with a JSON-Patch sequence.
    pub fn patch(query: &Query, patches: Vec<Document>) -> Self {
        Self::new(
            OperationName::Patch,
            doc! { "query": query.to_document(), "patches": patches },
        )
    }

    /// `delete` of every document matching `query`.
    pub fn delete(query: &Query) -> Self {
        Self::new(OperationName::Delete, doc! { "query": query.to_document() })
    }
}

/// The payload of an [`OperationResponse`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// The operation produced nothing worth returning.
    Empty,
    /// A single document, or `None` when nothing matched.
    Result(Option<Document>),
    /// A list of documents.
    Results(Vec<Document>),
    /// A number of documents.
    Count(u64),
    /// The identifier of a newly created document.
    Id(Bson),
    /// The operation failed.
    Error(InterfaceError),
}

impl ResponseBody {
    /// Renders the body as `{result}`, `{results}`, `{count}`, `{id}` or `{error}`.
    ///
    /// Returns `None` for [`ResponseBody::Empty`].
    pub fn to_document(&self) -> Option<Document> {
        match self {
            ResponseBody::Empty => None,
            ResponseBody::Result(result) => Some(doc! {
                "result": result.clone().map(Bson::Document).unwrap_or(Bson::Null),
            }),
            ResponseBody::Results(results) => Some(doc! { "results": results.clone() }),
            ResponseBody::Count(count) => Some(doc! { "count": to_bson_count(*count) }),
            ResponseBody::Id(id) => Some(doc! { "id": id.clone() }),
            ResponseBody::Error(err) => Some(doc! { "error": err.to_wire() }),
        }
    }

    /// Returns the error carried by the body, if any.
    pub fn error(&self) -> Option<&InterfaceError> {
        match self {
            ResponseBody::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// A normalized operation response.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResponse {
    /// The operation that produced the response. `None` when no operation could be determined.
    pub method: Option<OperationName>,
    /// The outcome.
    pub body: ResponseBody,
}

impl OperationResponse {
    pub fn new(method: Option<OperationName>, body: ResponseBody) -> Self {
        Self { method, body }
    }

    /// A response carrying an error.
    pub fn error(method: Option<OperationName>, err: InterfaceError) -> Self {
        Self::new(method, ResponseBody::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_names_round_trip_through_strings() {
        for operation in OperationName::ALL {
            assert_eq!(operation.as_str().parse::<OperationName>().ok(), Some(operation));
        }
        assert!(matches!(
            "upsert".parse::<OperationName>(),
            Err(InterfaceError::UnknownOperation(name)) if name == "upsert"
        ));
    }

    #[test]
    fn query_parses_coerced_values() {
        let query = Query::try_from(doc! {
            "query": { "age": { "$gt": 3 } },
            "sort": "name -age",
            "skip": "2",
            "limit": 5.0,
            "populate": "owner, tags",
        })
        .unwrap();

        assert_eq!(query.query, doc! { "age": { "$gt": 3 } });
        assert_eq!(query.sort, Some(doc! { "name": 1, "age": -1 }));
        assert_eq!((query.skip, query.limit), (Some(2), Some(5)));
        assert_eq!(query.populate, vec!["owner".to_string(), "tags".to_string()]);
    }

    #[test]
    fn missing_filter_is_empty() {
        let query = Query::try_from(doc! { "limit": 1 }).unwrap();
        assert!(query.query.is_empty());
    }

    #[test]
    fn negative_skip_is_rejected() {
        let err = Query::try_from(doc! { "skip": -1 }).unwrap_err();
        assert_eq!(err.kind(), "InvalidQuery");
        assert_eq!(err.http_code(), 400);
    }

    #[test]
    fn response_bodies_render_their_envelope() {
        assert_eq!(ResponseBody::Empty.to_document(), None);
        assert_eq!(
            ResponseBody::Result(None).to_document(),
            Some(doc! { "result": Bson::Null })
        );
        assert_eq!(ResponseBody::Count(3).to_document(), Some(doc! { "count": 3_i64 }));
    }
}
