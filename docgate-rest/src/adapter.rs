//! The REST adapter: HTTP in, operation out, HTTP back.
//!
//! [`RestAdapter::execute`] accepts any `http::Request` and always answers. Failures to build
//! the operation request are reported the same way store failures are, as an error body with
//! the status the error maps to.
//!
//! | outcome                         | status | notes                                   |
//! |---------------------------------|--------|-----------------------------------------|
//! | error                           | code   | `Allow` replayed for method errors      |
//! | write without a body            | 204    |                                         |
//! | single result not found         | 404    | empty body                              |
//! | created                         | 201    | `Location` points at the new document   |
//! | unchanged since `If-Modified-Since` | 304 | empty body                             |
//! | anything else                   | 200    | `HEAD` answers with `X-Count` only      |

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Request, State},
    response::Response,
};
use bson::{Bson, Document};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header, request::Parts};
use tracing::{debug, warn};
use url::Url;

use docgate_core::{
    backend::StoreBackend,
    dispatcher::SimpleInterface,
    error::InterfaceError,
    operation::{OperationName, OperationResponse, ResponseBody},
};

use crate::{
    codec::{Codec, DefaultCodec},
    options::{ParseOptions, RestOptions},
    request::{interface_request_from_http_request, operation_for, request_target, resolve_url},
};

/// Header carrying the number of matches on `HEAD` responses.
pub const X_COUNT: HeaderName = HeaderName::from_static("x-count");

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Serves one collection over HTTP.
#[derive(Debug)]
pub struct RestAdapter<B: StoreBackend> {
    interface: SimpleInterface<B>,
    options: RestOptions,
    codec: Arc<dyn Codec>,
}

impl<B: StoreBackend> RestAdapter<B> {
    /// Creates an adapter with default options and the JSON/BSON codec.
    pub fn new(interface: SimpleInterface<B>) -> Self {
        Self::builder(interface).build()
    }

    pub fn builder(interface: SimpleInterface<B>) -> RestAdapterBuilder<B> {
        RestAdapterBuilder::new(interface)
    }

    pub fn interface(&self) -> &SimpleInterface<B> {
        &self.interface
    }

    pub fn options(&self) -> &RestOptions {
        &self.options
    }

    /// Handles a request with the adapter's default parse options.
    pub async fn execute(&self, request: Request) -> Response {
        self.execute_with(request, &self.options.parse).await
    }

    /// Handles a request with explicit parse options.
    pub async fn execute_with(&self, request: Request, parse: &ParseOptions) -> Response {
        let (parts, body) = request.into_parts();
        debug!(method = %parts.method, uri = %parts.uri, "handling REST request");

        let url = match resolve_url(&request_target(&parts), &self.options) {
            Ok(resolved) => resolved.url,
            Err(err) => return self.render(&parts, None, OperationResponse::error(None, err)),
        };

        let body = if parse.skip_body {
            Bytes::new()
        } else {
            match to_bytes(body, self.options.body_limit).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    let err = InterfaceError::InvalidRequest(format!("unable to read body: {err}"));
                    return self.render(&parts, Some(&url), self.failed(&parts, &url, err));
                }
            }
        };

        let response = match interface_request_from_http_request(
            &parts,
            &body,
            &self.options,
            parse,
            self.codec.as_ref(),
        ) {
            Ok(request) => self.interface.execute(request).await,
            Err(err) => {
                debug!(kind = err.kind(), error = %err, "rejected REST request");
                self.failed(&parts, &url, err)
            }
        };

        self.render(&parts, Some(&url), response)
    }

    /// Wraps the adapter in an axum router that sends every path to it.
    ///
    /// When nesting the router under a path, set the base URL to that path so identifiers and
    /// `Location` headers are resolved against the URI the client sent.
    pub fn router(self: Arc<Self>) -> Router
    where
        B: 'static,
    {
        Router::new().fallback(handle::<B>).with_state(self)
    }

    /// A response for a request that never reached the interface, attributed to the operation
    /// its verb maps to.
    fn failed(&self, parts: &Parts, url: &Url, err: InterfaceError) -> OperationResponse {
        let has_pathname = resolve_url(url.as_str(), &self.options)
            .map(|resolved| resolved.target_id.is_some())
            .unwrap_or(false);

        OperationResponse::error(operation_for(&parts.method, has_pathname), err)
    }

    fn render(&self, parts: &Parts, url: Option<&Url>, response: OperationResponse) -> Response {
        let is_head = parts.method == Method::HEAD;
        let mut headers = HeaderMap::new();

        let status = match &response.body {
            ResponseBody::Error(err) => {
                for (name, values) in err.headers() {
                    insert_header(&mut headers, name, &values.join(", "));
                }
                StatusCode::from_u16(err.http_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ResponseBody::Empty => return empty(StatusCode::NO_CONTENT, headers),
            ResponseBody::Result(None) => {
                if is_head {
                    insert_header(&mut headers, X_COUNT.as_str(), "0");
                }
                return empty(StatusCode::NOT_FOUND, headers);
            }
            ResponseBody::Result(Some(document)) => {
                if let Some(modified) = self.last_modified(document) {
                    if not_modified_since(&parts.headers, modified) {
                        debug!(
                            method = ?response.method,
                            "not modified since the conditional date"
                        );
                        return empty(StatusCode::NOT_MODIFIED, headers);
                    }
                    insert_header(
                        &mut headers,
                        header::LAST_MODIFIED.as_str(),
                        &modified.format(HTTP_DATE_FORMAT).to_string(),
                    );
                }
                if is_head {
                    insert_header(&mut headers, X_COUNT.as_str(), "1");
                }
                StatusCode::OK
            }
            ResponseBody::Results(documents) => {
                if is_head {
                    insert_header(&mut headers, X_COUNT.as_str(), &documents.len().to_string());
                }
                StatusCode::OK
            }
            ResponseBody::Count(count) => {
                if is_head {
                    insert_header(&mut headers, X_COUNT.as_str(), &count.to_string());
                }
                StatusCode::OK
            }
            ResponseBody::Id(id) => {
                if let Some(location) = url.and_then(|url| location_of(url, id)) {
                    insert_header(&mut headers, header::LOCATION.as_str(), location.as_str());
                }
                StatusCode::CREATED
            }
        };

        debug!(method = ?response.method, status = status.as_u16(), "rendering REST response");

        if is_head {
            return empty(status, headers);
        }

        let Some(document) = response.body.to_document() else {
            return empty(status, headers);
        };

        let selection = self
            .codec
            .header_to_serialization_format(&parts.headers, header::ACCEPT);

        match self.codec.serialize_object(&document, selection.format) {
            Ok(bytes) => {
                insert_header(&mut headers, header::CONTENT_TYPE.as_str(), &selection.mime_type);
                build_response(status, headers, Body::from(bytes))
            }
            Err(err) => {
                warn!(error = %err, "unable to serialize response body");
                empty(StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new())
            }
        }
    }

    fn last_modified(&self, document: &Document) -> Option<DateTime<Utc>> {
        match document.get(&self.options.last_modified_field)? {
            Bson::DateTime(dt) => Some(dt.to_chrono()),
            Bson::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Bson::Int64(millis) => DateTime::from_timestamp_millis(*millis),
            _ => None,
        }
    }
}

async fn handle<B: StoreBackend + 'static>(
    State(adapter): State<Arc<RestAdapter<B>>>,
    request: Request,
) -> Response {
    adapter.execute(request).await
}

/// True when the request carries an `If-Modified-Since` no older than `modified`.
///
/// HTTP dates have whole-second resolution, so the comparison drops sub-second precision.
fn not_modified_since(headers: &HeaderMap, modified: DateTime<Utc>) -> bool {
    let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date)
    else {
        return false;
    };

    modified.timestamp() <= since.timestamp()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The request URL without its query, extended by the new identifier.
fn location_of(url: &Url, id: &Bson) -> Option<Url> {
    let id = match id {
        Bson::String(id) => id.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::Null => return None,
        other => other.to_string(),
    };

    let mut location = url.clone();
    location.set_query(None);
    location.set_fragment(None);

    {
        let mut segments = location.path_segments_mut().ok()?;
        segments.pop_if_empty().push(&id);
    }

    Some(location)
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
        warn!(header = name, "dropping header with an invalid name");
        return;
    };

    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => warn!(header = %name, "dropping header with an invalid value"),
    }
}

fn empty(status: StatusCode, headers: HeaderMap) -> Response {
    build_response(status, headers, Body::empty())
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Builder for [`RestAdapter`].
pub struct RestAdapterBuilder<B: StoreBackend> {
    interface: SimpleInterface<B>,
    options: RestOptions,
    codec: Arc<dyn Codec>,
}

impl<B: StoreBackend> RestAdapterBuilder<B> {
    pub fn new(interface: SimpleInterface<B>) -> Self {
        Self {
            interface,
            options: RestOptions::default(),
            codec: Arc::new(DefaultCodec::default()),
        }
    }

    pub fn base_url(mut self, base_url: Url) -> Self {
        self.options.base_url = Some(base_url);
        self
    }

    /// Restricts the served operations. Duplicates are dropped.
    pub fn allowed_methods(mut self, operations: impl IntoIterator<Item = OperationName>) -> Self {
        let mut allowed: Vec<OperationName> = Vec::new();
        for operation in operations {
            if !allowed.contains(&operation) {
                allowed.push(operation);
            }
        }
        self.options.allowed_methods = Some(allowed);
        self
    }

    pub fn last_modified_field(mut self, field: impl Into<String>) -> Self {
        self.options.last_modified_field = field.into();
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.options.body_limit = limit;
        self
    }

    pub fn parse_options(mut self, parse: ParseOptions) -> Self {
        self.options.parse = parse;
        self
    }

    pub fn options(mut self, options: RestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn build(self) -> RestAdapter<B> {
        RestAdapter {
            interface: self.interface,
            options: self.options,
            codec: self.codec,
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use docgate_core::interface::DataInterface;
    use docgate_memory::InMemoryStore;
    use serde_json::{Value, json};

    use super::*;

    fn pets() -> SimpleInterface<InMemoryStore> {
        SimpleInterface::new(DataInterface::new(InMemoryStore::new(), "pets"))
    }

    fn adapter() -> RestAdapter<InMemoryStore> {
        RestAdapter::new(pets())
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request {
        let builder = http::Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_then_fetch() {
        let adapter = adapter();

        let created = adapter
            .execute(request(Method::POST, "/", Some(json!({ "fields": { "name": "Rex" } }))))
            .await;
        assert_eq!(created.status(), StatusCode::CREATED);

        let location = created.headers()[header::LOCATION].to_str().unwrap().to_string();
        let id = json_body(created).await["id"].as_str().unwrap().to_string();
        assert_eq!(location, format!("http://localhost/{id}"));

        let fetched = adapter.execute(request(Method::GET, &format!("/{id}"), None)).await;
        assert_eq!(fetched.status(), StatusCode::OK);
        assert!(fetched.headers().contains_key(header::LAST_MODIFIED));
        assert_eq!(
            fetched.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "application/json"
        );

        let body = json_body(fetched).await;
        assert_eq!(body["result"]["name"], "Rex");
        assert_eq!(body["result"]["id"], Value::String(id));
    }

    #[tokio::test]
    async fn missing_document_is_404_with_empty_body() {
        let response = adapter().execute(request(Method::GET, "/nope", None)).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn head_reports_counts() {
        let adapter = adapter();
        for name in ["a", "b", "c"] {
            adapter
                .interface()
                .create(doc! { "name": name })
                .await
                .unwrap();
        }

        let response = adapter.execute(request(Method::HEAD, "/?query%5Bname%5D=b", None)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&X_COUNT], "1");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn conditional_get_answers_304() {
        let adapter = adapter();
        let created = adapter.interface().create(doc! { "name": "Rex" }).await.unwrap();
        let id = created.get_str("_id").unwrap();

        let first = adapter.execute(request(Method::GET, &format!("/{id}"), None)).await;
        let last_modified = first.headers()[header::LAST_MODIFIED].clone();

        let conditional = http::Request::builder()
            .method(Method::GET)
            .uri(format!("/{id}"))
            .header(header::IF_MODIFIED_SINCE, last_modified)
            .body(Body::empty())
            .unwrap();
        let second = adapter.execute(conditional).await;

        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn writes_answer_204() {
        let adapter = adapter();
        let created = adapter.interface().create(doc! { "name": "Rex" }).await.unwrap();
        let id = created.get_str("_id").unwrap();

        let updated = adapter
            .execute(request(
                Method::PUT,
                &format!("/{id}"),
                Some(json!({ "fields": { "age": 4 } })),
            ))
            .await;
        assert_eq!(updated.status(), StatusCode::NO_CONTENT);

        let patched = adapter
            .execute(request(
                Method::PATCH,
                &format!("/{id}"),
                Some(json!({ "patches": [{ "op": "replace", "path": "/age", "value": 5 }] })),
            ))
            .await;
        assert_eq!(patched.status(), StatusCode::NO_CONTENT);

        let found = adapter.interface().find_by_id(&Bson::from(id)).await.unwrap().unwrap();
        assert_eq!(found.get_i32("age").unwrap(), 5);

        let deleted = adapter.execute(request(Method::DELETE, &format!("/{id}"), None)).await;
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
        assert_eq!(adapter.interface().find_by_id(&Bson::from(id)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn method_errors_replay_allow() {
        let adapter = RestAdapter::builder(pets())
            .allowed_methods([
                OperationName::Find,
                OperationName::FindOne,
                OperationName::Count,
                OperationName::Find,
            ])
            .build();
        assert_eq!(adapter.options().allowed_methods.as_ref().map(Vec::len), Some(3));

        let response = adapter
            .execute(request(Method::POST, "/", Some(json!({ "fields": {} }))))
            .await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, HEAD");
        let body = json_body(response).await;
        assert_eq!(body["error"]["kind"], "MethodNotAllowed");
        assert_eq!(body["error"]["httpCode"], 405);
    }

    #[tokio::test]
    async fn malformed_bodies_are_400() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{ nope"))
            .unwrap();

        let response = adapter().execute(request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["kind"], "Codec");
    }

    #[tokio::test]
    async fn bson_is_served_on_request() {
        let adapter = adapter();
        adapter.interface().create(doc! { "name": "Rex" }).await.unwrap();

        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/")
            .header(header::ACCEPT, "application/bson")
            .body(Body::empty())
            .unwrap();
        let response = adapter.execute(request).await;

        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/bson");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let document: Document = bson::de::deserialize_from_slice(&bytes).unwrap();
        assert_eq!(document.get_array("results").unwrap().len(), 1);
    }

    #[test]
    fn locations_drop_the_query() {
        let url = Url::parse("http://api.test/pets?x=1").unwrap();
        let location = location_of(&url, &Bson::from("a b")).unwrap();

        assert_eq!(location.as_str(), "http://api.test/pets/a%20b");
    }

    #[tokio::test]
    async fn encoded_locations_lead_back_to_the_document() {
        let adapter = adapter();

        let created = adapter
            .execute(request(
                Method::POST,
                "/",
                Some(json!({ "fields": { "_id": "café au lait", "name": "Rex" } })),
            ))
            .await;
        let location = created.headers()[header::LOCATION].to_str().unwrap().to_string();
        assert_eq!(location, "http://localhost/caf%C3%A9%20au%20lait");

        let path = Url::parse(&location).unwrap().path().to_string();
        let fetched = adapter.execute(request(Method::GET, &path, None)).await;

        assert_eq!(fetched.status(), StatusCode::OK);
        assert_eq!(json_body(fetched).await["result"]["_id"], "café au lait");
    }
}
