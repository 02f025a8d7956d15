//! Error types and result types for store access and operation execution.
//!
//! Two layers of errors exist:
//!
//! - [`DocumentStoreError`] is what a [`StoreBackend`](crate::backend::StoreBackend) reports.
//! - [`InterfaceError`] is the wrapped error every caller of the data interface, the dispatcher
//!   and the protocol adapters sees. Each error kind is its own variant, so whether an error has
//!   already been wrapped is decided by its type rather than by probing a marker field.
//!
//! Use [`wrap_error`] to normalize any supported error into an [`InterfaceError`]. Wrapping an
//! `InterfaceError` returns it unchanged.

use std::sync::Arc;

use bson::{Document, doc, error::Error as BsonError};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::patch::PatchError;

/// Represents all possible errors that can occur when interacting with a document store.
///
/// This enum covers serialization errors, document lifecycle issues, collection management,
/// and backend-specific errors.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The document violates schema constraints or has invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

/// A response header an error asks the transport to replay, as a name and one or more values.
pub type ErrorHeader = (&'static str, Vec<String>);

/// The wrapped error exposed at every boundary of the gateway.
///
/// Every variant knows its HTTP status code and any headers that must accompany it, so the REST
/// adapter never inspects error internals. Store errors keep the original error as their source.
#[derive(Error, Debug, Clone)]
pub enum InterfaceError {
    /// The transport verb has no operation mapped to it.
    #[error("Invalid method: {method}")]
    InvalidMethod {
        /// The verb that was received.
        method: String,
        /// Every verb that does map to an operation.
        allowed: Vec<String>,
    },
    /// The verb maps to an operation that the adapter's policy excludes.
    #[error("Method {method} is not allowed")]
    MethodNotAllowed {
        /// The verb that was received.
        method: String,
        /// The verbs the policy permits.
        allowed: Vec<String>,
    },
    /// The operation name is not one of the supported operations.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
    /// The query could not be translated into a store query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// The operation payload is missing a field or has the wrong shape.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// A message body could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),
    /// A JSON-Patch operation could not be applied.
    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),
    /// The store rejected or failed the operation.
    #[error("Store error: {0}")]
    Store(#[source] Arc<DocumentStoreError>),
}

/// A specialized `Result` type for gateway operations.
pub type InterfaceResult<T> = Result<T, InterfaceError>;

impl InterfaceError {
    /// Returns a short, stable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            InterfaceError::InvalidMethod { .. } => "InvalidMethod",
            InterfaceError::MethodNotAllowed { .. } => "MethodNotAllowed",
            InterfaceError::UnknownOperation(_) => "UnknownOperation",
            InterfaceError::InvalidQuery(_) => "InvalidQuery",
            InterfaceError::InvalidRequest(_) => "InvalidRequest",
            InterfaceError::Codec(_) => "Codec",
            InterfaceError::Patch(_) => "Patch",
            InterfaceError::Store(_) => "Store",
        }
    }

    /// Returns the human readable message.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns the HTTP status code this error maps to.
    pub fn http_code(&self) -> u16 {
        match self {
            InterfaceError::InvalidMethod { .. } | InterfaceError::MethodNotAllowed { .. } => 405,
            InterfaceError::UnknownOperation(_)
            | InterfaceError::InvalidQuery(_)
            | InterfaceError::InvalidRequest(_)
            | InterfaceError::Codec(_) => 400,
            InterfaceError::Patch(_) => 422,
            InterfaceError::Store(err) => match err.as_ref() {
                DocumentStoreError::DocumentAlreadyExists(..) => 409,
                DocumentStoreError::InvalidDocument(_) => 400,
                _ => 500,
            },
        }
    }

    /// Returns the headers a transport must send along with this error.
    pub fn headers(&self) -> Vec<ErrorHeader> {
        match self {
            InterfaceError::InvalidMethod { allowed, .. }
            | InterfaceError::MethodNotAllowed { allowed, .. } => vec![("Allow", allowed.clone())],
            _ => Vec::new(),
        }
    }

    /// Returns the message of the underlying error, if this error wraps one.
    pub fn inner_message(&self) -> Option<String> {
        match self {
            InterfaceError::Store(err) => Some(err.to_string()),
            InterfaceError::Patch(err) => Some(err.to_string()),
            _ => None,
        }
    }

    /// Renders the error as plain data for transports.
    ///
    /// The rendering carries `message`, `httpCode` and `kind`, plus `innerError` when an
    /// underlying error exists.
    pub fn to_wire(&self) -> Document {
        let http_code = i32::from(self.http_code());
        let mut wire = doc! {
            "message": self.message(),
            "httpCode": http_code,
            "kind": self.kind(),
        };

        if let Some(inner) = self.inner_message() {
            wire.insert("innerError", doc! { "message": inner });
        }

        wire
    }
}

impl PartialEq for InterfaceError {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
            && self.message() == other.message()
            && self.headers() == other.headers()
    }
}

impl From<DocumentStoreError> for InterfaceError {
    fn from(err: DocumentStoreError) -> Self {
        InterfaceError::Store(Arc::new(err))
    }
}

impl From<BsonError> for InterfaceError {
    fn from(err: BsonError) -> Self {
        InterfaceError::from(DocumentStoreError::from(err))
    }
}

/// Normalizes an error into the wrapped [`InterfaceError`] shape.
///
/// Already wrapped errors pass through untouched, so `wrap_error(wrap_error(e)) == wrap_error(e)`.
pub fn wrap_error<E: Into<InterfaceError>>(err: E) -> InterfaceError {
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_is_idempotent() {
        let once = wrap_error(DocumentStoreError::Backend("connection reset".into()));
        let twice = wrap_error(once.clone());

        assert_eq!(once, twice);
        assert_eq!(twice.kind(), "Store");
        assert_eq!(twice.inner_message().as_deref(), Some("Backend error: connection reset"));
    }

    #[test]
    fn store_errors_keep_their_source() {
        let err = wrap_error(DocumentStoreError::Unknown("boom".into()));
        let source = std::error::Error::source(&err).map(ToString::to_string);

        assert_eq!(source.as_deref(), Some("Unknown error: boom"));
        assert_eq!(err.http_code(), 500);
    }

    #[test]
    fn conflicts_map_to_409() {
        let err = wrap_error(DocumentStoreError::DocumentAlreadyExists("a".into(), "users".into()));
        assert_eq!(err.http_code(), 409);
    }

    #[test]
    fn method_errors_carry_allow_header() {
        let err = InterfaceError::MethodNotAllowed {
            method: "DELETE".into(),
            allowed: vec!["GET".into(), "HEAD".into()],
        };

        assert_eq!(err.http_code(), 405);
        assert_eq!(err.headers(), vec![("Allow", vec!["GET".to_string(), "HEAD".to_string()])]);
    }

    #[test]
    fn wire_form_has_no_marker_field() {
        let wire = wrap_error(DocumentStoreError::Backend("down".into())).to_wire();

        assert_eq!(wire.get_str("kind").ok(), Some("Store"));
        assert_eq!(wire.get_i32("httpCode").ok(), Some(500));
        assert!(wire.get_document("innerError").is_ok());
        assert_eq!(wire.len(), 4);
    }
}
