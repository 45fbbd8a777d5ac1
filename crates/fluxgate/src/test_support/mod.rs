//! In-memory [`WebContext`] implementation backing unit tests.

use std::collections::HashMap;

use bytes::Bytes;
use fluxgate_sdk::{ServeError, WebContext};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::Value;

/// Web context over plain maps; every source of argument values can be
/// seeded independently.
pub struct MockWebContext {
    method: String,
    host: String,
    request_uri: String,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    query: HashMap<String, String>,
    path_params: HashMap<String, String>,
    form: HashMap<String, String>,
    cookies: HashMap<String, String>,
    values: HashMap<String, Value>,
    response_headers: HeaderMap,
    written: Option<(StatusCode, Bytes)>,
}

impl MockWebContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            method: "GET".to_string(),
            host: "localhost".to_string(),
            request_uri: "/".to_string(),
            path: "/".to_string(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            query: HashMap::new(),
            path_params: HashMap::new(),
            form: HashMap::new(),
            cookies: HashMap::new(),
            values: HashMap::new(),
            response_headers: HeaderMap::new(),
            written: None,
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_string();
        self
    }

    #[must_use]
    pub fn with_uri(mut self, uri: &str) -> Self {
        self.request_uri = uri.to_string();
        self.path = uri.split('?').next().unwrap_or("/").to_string();
        self
    }

    #[must_use]
    pub fn with_query_value(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_path_value(mut self, name: &str, value: &str) -> Self {
        self.path_params.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_form_value(mut self, name: &str, value: &str) -> Self {
        self.form.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
        self
    }

    #[must_use]
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Status and body committed through `response_write`, if any.
    #[must_use]
    pub fn written(&self) -> Option<&(StatusCode, Bytes)> {
        self.written.as_ref()
    }
}

impl Default for MockWebContext {
    fn default() -> Self {
        Self::new()
    }
}

impl WebContext for MockWebContext {
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn request_uri(&self) -> &str {
        &self.request_uri
    }

    fn request_path(&self) -> &str {
        &self.path
    }

    fn request_headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn request_body(&self) -> Bytes {
        self.body.clone()
    }

    fn query_value(&self, name: &str) -> Option<String> {
        self.query.get(name).cloned()
    }

    fn path_value(&self, name: &str) -> Option<String> {
        self.path_params.get(name).cloned()
    }

    fn form_value(&self, name: &str) -> Option<String> {
        self.form.get(name).cloned()
    }

    fn cookie_value(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }

    fn set_value(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    fn get_value(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    fn response_write(&mut self, status: StatusCode, body: Bytes) -> Result<(), ServeError> {
        self.written = Some((status, body));
        Ok(())
    }
}
