use std::collections::HashMap;

use bytes::Bytes;
use fluxgate_sdk::{ServeError, WebContext};
use http::request::Parts;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

/// [`WebContext`] implementation over a buffered axum request.
///
/// Everything is captured up front: the body is read once by the dispatch
/// handler, query/form pairs are pre-parsed, path parameters come from the
/// gateway's own pattern match. The written response stays buffered here
/// until the dispatch handler turns it into an axum response.
pub struct AxumWebContext {
    method: String,
    host: String,
    request_uri: String,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    query: Vec<(String, String)>,
    path_params: HashMap<String, String>,
    form: Vec<(String, String)>,
    values: HashMap<String, Value>,
    response_headers: HeaderMap,
    written: Option<(StatusCode, Bytes)>,
}

impl AxumWebContext {
    #[must_use]
    pub fn new(parts: Parts, body: Bytes, path_params: HashMap<String, String>) -> Self {
        let host = parts
            .headers
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.as_str().to_string()))
            .unwrap_or_default();
        let request_uri = parts
            .uri
            .path_and_query()
            .map_or_else(|| "/".to_string(), |pq| pq.as_str().to_string());
        let path = parts.uri.path().to_string();
        let query = parts
            .uri
            .query()
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        let form = if is_form_content(&parts.headers) {
            form_urlencoded::parse(&body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            method: parts.method.as_str().to_string(),
            host,
            request_uri,
            path,
            headers: parts.headers,
            body,
            query,
            path_params,
            form,
            values: HashMap::new(),
            response_headers: HeaderMap::new(),
            written: None,
        }
    }

    /// Response committed through the capability contract, with the headers
    /// accumulated alongside it. `None` when nothing was written.
    #[must_use]
    pub fn take_response(&mut self) -> Option<(StatusCode, HeaderMap, Bytes)> {
        let (status, body) = self.written.take()?;
        Some((status, std::mem::take(&mut self.response_headers), body))
    }
}

fn is_form_content(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

impl WebContext for AxumWebContext {
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
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    fn path_value(&self, name: &str) -> Option<String> {
        self.path_params.get(name).cloned()
    }

    fn form_value(&self, name: &str) -> Option<String> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    fn cookie_value(&self, name: &str) -> Option<String> {
        let cookies = self.headers.get(http::header::COOKIE)?.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then(|| v.to_string())
        })
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
