use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::error::ServeError;

/// Capability contract the gateway consumes from a pluggable web server.
///
/// One value exists per in-flight request and is owned by exactly one task.
/// The request body is buffered by the adapter, so `request_body` is
/// repeatable. Implementations live in web-server adapters; the core never
/// touches the underlying server type.
pub trait WebContext: Send {
    /// Escape hatch to the adapter's concrete context type.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;

    fn method(&self) -> &str;
    fn host(&self) -> &str;
    /// Raw request target as received, path plus query.
    fn request_uri(&self) -> &str;
    /// Decoded request path without the query string.
    fn request_path(&self) -> &str;

    fn request_headers(&self) -> &HeaderMap;
    fn header(&self, name: &str) -> Option<String> {
        self.request_headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Buffered request body; repeatable.
    fn request_body(&self) -> Bytes;

    fn query_value(&self, name: &str) -> Option<String>;
    fn path_value(&self, name: &str) -> Option<String>;
    fn form_value(&self, name: &str) -> Option<String>;
    fn cookie_value(&self, name: &str) -> Option<String>;

    /// Per-request bag bridging adapter state into the gateway.
    fn set_value(&mut self, name: &str, value: Value);
    fn get_value(&self, name: &str) -> Option<Value>;

    fn response_headers_mut(&mut self) -> &mut HeaderMap;

    /// Commit status and body to the client.
    ///
    /// # Errors
    ///
    /// Returns an error when the adapter cannot write (connection gone,
    /// response already committed).
    fn response_write(&mut self, status: StatusCode, body: Bytes) -> Result<(), ServeError>;
}
