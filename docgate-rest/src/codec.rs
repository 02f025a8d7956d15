//! Body serialization for the REST adapter.
//!
//! A [`Codec`] turns documents into response bytes and request bytes into documents, and picks
//! a [`SerializationFormat`] from an `Accept` or `Content-Type` header. [`DefaultCodec`] speaks
//! JSON and BSON.
//!
//! JSON has no native datetime or object id, so BSON datetimes render as RFC 3339 strings and
//! object ids as their hex form.

use std::fmt::Debug;

use bson::{Bson, Document};
use bytes::Bytes;
use chrono::SecondsFormat;
use http::{HeaderMap, HeaderName};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use docgate_core::error::InterfaceError;

/// A wire format the codec can produce and consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationFormat {
    Json,
    Bson,
}

impl SerializationFormat {
    /// The canonical media type of the format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            SerializationFormat::Json => "application/json",
            SerializationFormat::Bson => "application/bson",
        }
    }

    /// Recognizes a media type, ignoring parameters such as `charset` or `q`.
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/json" | "text/json" => Some(SerializationFormat::Json),
            "application/bson" => Some(SerializationFormat::Bson),
            other if other.ends_with("+json") => Some(SerializationFormat::Json),
            _ => None,
        }
    }
}

/// The format chosen for a header, with the media type to announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSelection {
    pub format: SerializationFormat,
    pub mime_type: String,
}

impl From<SerializationFormat> for FormatSelection {
    fn from(format: SerializationFormat) -> Self {
        Self {
            format,
            mime_type: format.mime_type().to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid BSON: {0}")]
    Bson(String),
    #[error("Expected an object at the top level")]
    NotADocument,
}

impl From<CodecError> for InterfaceError {
    fn from(err: CodecError) -> Self {
        InterfaceError::Codec(err.to_string())
    }
}

/// Serialization boundary of the REST adapter.
pub trait Codec: Send + Sync + Debug {
    /// Encodes a document in the given format.
    fn serialize_object(
        &self,
        object: &Document,
        format: SerializationFormat,
    ) -> Result<Bytes, CodecError>;

    /// Decodes a document from bytes in the given format.
    fn deserialize_object(
        &self,
        bytes: &[u8],
        format: SerializationFormat,
    ) -> Result<Document, CodecError>;

    /// Chooses the format named by `header`, or the codec's default when the header is absent,
    /// a wildcard, or names nothing the codec understands.
    fn header_to_serialization_format(
        &self,
        headers: &HeaderMap,
        header: HeaderName,
    ) -> FormatSelection;
}

/// JSON and BSON codec.
#[derive(Debug, Clone, Copy)]
pub struct DefaultCodec {
    default_format: SerializationFormat,
}

impl Default for DefaultCodec {
    fn default() -> Self {
        Self::new(SerializationFormat::Json)
    }
}

impl DefaultCodec {
    pub fn new(default_format: SerializationFormat) -> Self {
        Self { default_format }
    }

    pub fn default_format(&self) -> SerializationFormat {
        self.default_format
    }
}

impl Codec for DefaultCodec {
    fn serialize_object(
        &self,
        object: &Document,
        format: SerializationFormat,
    ) -> Result<Bytes, CodecError> {
        match format {
            SerializationFormat::Json => {
                let value = document_to_json(object);
                Ok(Bytes::from(serde_json::to_vec(&value)?))
            }
            SerializationFormat::Bson => bson::ser::serialize_to_vec(object)
                .map(Bytes::from)
                .map_err(|e| CodecError::Bson(e.to_string())),
        }
    }

    fn deserialize_object(
        &self,
        bytes: &[u8],
        format: SerializationFormat,
    ) -> Result<Document, CodecError> {
        match format {
            SerializationFormat::Json => match json_to_bson(serde_json::from_slice(bytes)?) {
                Bson::Document(document) => Ok(document),
                _ => Err(CodecError::NotADocument),
            },
            SerializationFormat::Bson => {
                bson::de::deserialize_from_slice(bytes).map_err(|e| CodecError::Bson(e.to_string()))
            }
        }
    }

    fn header_to_serialization_format(
        &self,
        headers: &HeaderMap,
        header: HeaderName,
    ) -> FormatSelection {
        headers
            .get_all(header)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .find_map(|candidate| {
                SerializationFormat::from_mime_type(candidate).map(|format| FormatSelection {
                    format,
                    mime_type: format.mime_type().to_string(),
                })
            })
            .unwrap_or_else(|| self.default_format.into())
    }
}

/// Converts a JSON value into BSON. Integers become `Int32` when they fit, `Int64` otherwise.
pub fn json_to_bson(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => number_to_bson(&n),
        Value::String(s) => Bson::String(s),
        Value::Array(values) => Bson::Array(values.into_iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(
            map.into_iter()
                .map(|(key, value)| (key, json_to_bson(value)))
                .collect(),
        ),
    }
}

fn number_to_bson(n: &Number) -> Bson {
    if let Some(i) = n.as_i64() {
        return i32::try_from(i).map(Bson::Int32).unwrap_or(Bson::Int64(i));
    }

    Bson::Double(n.as_f64().unwrap_or(f64::NAN))
}

/// Converts a BSON value into JSON.
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(n) => Value::from(*n),
        Bson::Int64(n) => Value::from(*n),
        Bson::Double(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Array(values) => Value::Array(values.iter().map(bson_to_json).collect()),
        Bson::Document(document) => document_to_json(document),
        Bson::DateTime(dt) => {
            Value::String(dt.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        other => Value::String(other.to_string()),
    }
}

/// Converts a document into a JSON object.
pub fn document_to_json(document: &Document) -> Value {
    Value::Object(
        document
            .iter()
            .map(|(key, value)| (key.clone(), bson_to_json(value)))
            .collect::<Map<String, Value>>(),
    )
}
