//! Configuration of the REST adapter.
//!
//! [`RestOptions`] is fixed when the adapter is built. [`ParseOptions`] governs how a single
//! request is read; the adapter carries defaults and
//! [`RestAdapter::execute_with`](crate::RestAdapter::execute_with) accepts an explicit value
//! per call.

use url::Url;

use docgate_core::operation::OperationName;

use crate::request::verb_for;

/// Base used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost/";
/// Field whose value drives `Last-Modified` and `If-Modified-Since`.
pub const DEFAULT_LAST_MODIFIED_FIELD: &str = "updatedAt";
/// Largest request body read, in bytes.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// How a single request is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Ignore the request body entirely.
    pub skip_body: bool,
    /// Turn query string values such as `true` or `42` into booleans and numbers.
    pub coerce_query_values: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            skip_body: false,
            coerce_query_values: true,
        }
    }
}

/// Adapter-wide REST configuration.
#[derive(Debug, Clone)]
pub struct RestOptions {
    /// URL the collection is served under. Paths below it address single documents.
    pub base_url: Option<Url>,
    /// Operations the adapter serves. `None` serves every operation a verb maps to.
    pub allowed_methods: Option<Vec<OperationName>>,
    /// Field holding the modification time of a document.
    pub last_modified_field: String,
    /// Largest request body read, in bytes.
    pub body_limit: usize,
    /// Default per-request parsing.
    pub parse: ParseOptions,
}

impl Default for RestOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            allowed_methods: None,
            last_modified_field: DEFAULT_LAST_MODIFIED_FIELD.to_string(),
            body_limit: DEFAULT_BODY_LIMIT,
            parse: ParseOptions::default(),
        }
    }
}

impl RestOptions {
    /// Whether `operation` passes the allowed-methods policy.
    pub fn allows(&self, operation: OperationName) -> bool {
        self.allowed_methods
            .as_ref()
            .is_none_or(|allowed| allowed.contains(&operation))
    }

    /// The verbs reaching the allowed operations, as header values deduplicated in
    /// configuration order.
    pub fn allowed_method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();

        for operation in self.allowed_methods.iter().flatten() {
            let name = verb_for(*operation).as_str().to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }

        names
    }
}
