//! Mapping of HTTP requests onto operation requests.
//!
//! | verb     | operation                               |
//! |----------|-----------------------------------------|
//! | `GET`    | `findOne` on `/<id>`, `find` otherwise  |
//! | `HEAD`   | `count`, or `findOne` on `/<id>`        |
//! | `POST`   | `create`                                |
//! | `PUT`    | `update`                                |
//! | `PATCH`  | `patch`                                 |
//! | `DELETE` | `delete`                                |
//!
//! The payload is assembled from three sources. The decoded body comes first, the query string
//! is merged over `body.query`, and a path identifier is written to `body.query.query._id` last.

use axum::extract::OriginalUri;
use bson::{Bson, Document, doc};
use http::{Method, header, request::Parts};
use url::Url;

use docgate_core::{
    error::{InterfaceError, InterfaceResult},
    operation::{OperationName, OperationRequest},
    pojo::ID_FIELD,
};

use crate::{
    codec::Codec,
    options::{DEFAULT_BASE_URL, ParseOptions, RestOptions},
};

/// Every verb that maps to an operation.
pub const MAPPED_METHODS: [Method; 6] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// The request URL split into what the adapter needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUrl {
    /// Absolute request URL.
    pub url: Url,
    /// Percent-decoded path below the base URL, without surrounding slashes. `None` when the
    /// request addresses the collection itself.
    pub target_id: Option<String>,
}

/// The URI the client sent. Routers that nest the adapter strip their prefix from `parts.uri`,
/// so the original URI is preferred when axum recorded one.
pub fn request_target(parts: &Parts) -> String {
    parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| original.0.to_string())
        .unwrap_or_else(|| parts.uri.to_string())
}

/// Resolves a request target against the configured base URL.
pub fn resolve_url(target: &str, options: &RestOptions) -> InterfaceResult<ResolvedUrl> {
    let base = match &options.base_url {
        Some(base) => base.clone(),
        None => Url::parse(DEFAULT_BASE_URL).map_err(invalid_url)?,
    };
    let url = base.join(target).map_err(invalid_url)?;

    let base_path = base.path().trim_end_matches('/');
    let remainder = url
        .path()
        .strip_prefix(base_path)
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .unwrap_or(url.path())
        .trim_matches('/');

    let target_id = if remainder.is_empty() {
        None
    } else {
        let decoded = urlencoding::decode(remainder).map_err(|_| {
            InterfaceError::InvalidRequest("request path is not valid UTF-8".into())
        })?;
        Some(decoded.into_owned())
    };

    Ok(ResolvedUrl { url, target_id })
}

fn invalid_url(err: url::ParseError) -> InterfaceError {
    InterfaceError::InvalidRequest(format!("invalid request URL: {err}"))
}

/// The operation a verb maps to, given whether the URL addresses a single document.
pub fn operation_for(method: &Method, has_pathname: bool) -> Option<OperationName> {
    match *method {
        Method::GET if has_pathname => Some(OperationName::FindOne),
        Method::GET => Some(OperationName::Find),
        Method::HEAD => Some(OperationName::Count),
        Method::POST => Some(OperationName::Create),
        Method::PUT => Some(OperationName::Update),
        Method::PATCH => Some(OperationName::Patch),
        Method::DELETE => Some(OperationName::Delete),
        _ => None,
    }
}

/// The verb that reaches `operation`. `findById` has no route of its own and is reported as
/// `GET`.
pub fn verb_for(operation: OperationName) -> Method {
    match operation {
        OperationName::Find | OperationName::FindOne | OperationName::FindById => Method::GET,
        OperationName::Count => Method::HEAD,
        OperationName::Create => Method::POST,
        OperationName::Update => Method::PUT,
        OperationName::Patch => Method::PATCH,
        OperationName::Delete => Method::DELETE,
    }
}

/// Builds the operation request for an HTTP request whose body has already been read.
///
/// # Errors
///
/// Fails with `InvalidMethod` for unmapped verbs, `MethodNotAllowed` when the mapped operation
/// is outside the allowed set, and `Codec` when the body cannot be decoded.
pub fn interface_request_from_http_request(
    parts: &Parts,
    body: &[u8],
    options: &RestOptions,
    parse: &ParseOptions,
    codec: &dyn Codec,
) -> InterfaceResult<OperationRequest> {
    let resolved = resolve_url(&request_target(parts), options)?;
    let has_pathname = resolved.target_id.is_some();

    let mut method = operation_for(&parts.method, has_pathname).ok_or_else(|| {
        InterfaceError::InvalidMethod {
            method: parts.method.to_string(),
            allowed: MAPPED_METHODS.iter().map(ToString::to_string).collect(),
        }
    })?;

    if !options.allows(method) {
        return Err(InterfaceError::MethodNotAllowed {
            method: parts.method.to_string(),
            allowed: options.allowed_method_names(),
        });
    }

    let mut payload = if parse.skip_body || body.is_empty() {
        Document::new()
    } else {
        let selection = codec.header_to_serialization_format(&parts.headers, header::CONTENT_TYPE);
        codec.deserialize_object(body, selection.format)?
    };

    for (key, value) in resolved.url.query_pairs() {
        let path = query_key_path(&key);
        let value = if parse.coerce_query_values {
            coerce_query_value(&value)
        } else {
            Bson::String(value.into_owned())
        };
        set_path(query_document(&mut payload)?, &path, value);
    }

    if let Some(target_id) = resolved.target_id {
        let query = query_document(&mut payload)?;
        set_path(query, &["query".to_string(), ID_FIELD.to_string()], Bson::String(target_id));

        if method == OperationName::Count {
            method = OperationName::FindOne;
            let mut project = doc! { ID_FIELD: 1 };
            project.insert(options.last_modified_field.clone(), 1);
            query.insert("project", project);
        }
    }

    Ok(OperationRequest::new(method, payload))
}

/// Returns `payload.query`, creating it when absent.
fn query_document(payload: &mut Document) -> InterfaceResult<&mut Document> {
    if !matches!(payload.get("query"), Some(Bson::Document(_))) {
        if payload.get("query").is_some_and(|query| !matches!(query, Bson::Null)) {
            return Err(InterfaceError::InvalidRequest("query must be a document".into()));
        }
        payload.insert("query", Document::new());
    }

    payload
        .get_document_mut("query")
        .map_err(|_| InterfaceError::InvalidRequest("query must be a document".into()))
}

/// Splits a bracketed key: `query[age][$gt]` becomes `["query", "age", "$gt"]`.
///
/// An empty bracket pair (`tags[]`) yields an empty segment, which appends to an array.
pub fn query_key_path(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };

    let mut path = vec![key[..open].to_string()];
    let mut rest = &key[open..];

    while let Some(inner) = rest.strip_prefix('[') {
        match inner.find(']') {
            Some(close) => {
                path.push(inner[..close].to_string());
                rest = &inner[close + 1..];
            }
            None => {
                // Unbalanced brackets: keep the remainder verbatim.
                path.push(inner.to_string());
                rest = "";
            }
        }
    }

    path
}

/// Coerces booleans, `null` and numbers that print back identically.
pub fn coerce_query_value(value: &str) -> Bson {
    match value {
        "true" => return Bson::Boolean(true),
        "false" => return Bson::Boolean(false),
        "null" => return Bson::Null,
        _ => {}
    }

    if let Ok(n) = value.parse::<i64>()
        && n.to_string() == value
    {
        return i32::try_from(n).map(Bson::Int32).unwrap_or(Bson::Int64(n));
    }

    if let Ok(n) = value.parse::<f64>()
        && n.is_finite()
        && n.to_string() == value
    {
        return Bson::Double(n);
    }

    Bson::String(value.to_string())
}

/// Writes `value` at `path`, creating intermediate documents and replacing scalars in the way.
fn set_path(document: &mut Document, path: &[String], value: Bson) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };

    if rest.is_empty() {
        document.insert(first.clone(), value);
        return;
    }

    if rest.len() == 1 && rest[0].is_empty() {
        match document.get_mut(first) {
            Some(Bson::Array(values)) => values.push(value),
            _ => {
                document.insert(first.clone(), Bson::Array(vec![value]));
            }
        }
        return;
    }

    if !matches!(document.get(first), Some(Bson::Document(_))) {
        document.insert(first.clone(), Document::new());
    }

    if let Some(Bson::Document(child)) = document.get_mut(first) {
        set_path(child, rest, value);
    }
}
