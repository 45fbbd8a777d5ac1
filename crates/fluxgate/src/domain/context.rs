use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use fluxgate_sdk::{Endpoint, WebContext};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde_json::Value;

/// Buffered upstream response carried on the request context until the
/// router writes it out.
#[derive(Debug)]
pub struct ResponseBuffer {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ResponseBuffer {
    fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body = Bytes::new();
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn set_headers(&mut self, headers: HeaderMap) -> &mut Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: Bytes) -> &mut Self {
        self.body = body;
        self
    }
}

/// Per-request context bundling the web adapter, the endpoint captured at
/// dispatch time, the attribute bag, and the buffered response.
///
/// Contexts are pooled: [`ContextPool::acquire`] hands out a reset instance,
/// [`ContextPool::release`] clears it and returns it. A context is owned by
/// exactly one task at a time; the endpoint pointer is captured once and
/// never re-read, so a request observes one endpoint version for its whole
/// duration even under concurrent table updates.
pub struct GatewayContext {
    request_id: String,
    endpoint: Option<Arc<Endpoint>>,
    web: Option<Box<dyn WebContext>>,
    attributes: HashMap<String, Value>,
    response: ResponseBuffer,
    started_at: Instant,
}

impl GatewayContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: String::new(),
            endpoint: None,
            web: None,
            attributes: HashMap::new(),
            response: ResponseBuffer::new(),
            started_at: Instant::now(),
        }
    }

    /// Bind a context to a request. Called once per acquisition.
    pub fn attach(
        &mut self,
        request_id: impl Into<String>,
        web: Box<dyn WebContext>,
        endpoint: Arc<Endpoint>,
    ) {
        self.request_id = request_id.into();
        self.web = Some(web);
        self.endpoint = Some(endpoint);
        self.started_at = Instant::now();
    }

    /// Clear all request state. Reuse after this point gets a blank context.
    pub fn release(&mut self) {
        self.request_id.clear();
        self.endpoint = None;
        self.web = None;
        self.attributes.clear();
        self.response.reset();
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Endpoint captured at dispatch time.
    ///
    /// # Panics
    ///
    /// Panics when called on a context that was never attached; the router
    /// attaches before running the chain.
    #[must_use]
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        self.endpoint.as_ref().expect("context not attached")
    }

    #[must_use]
    pub fn request(&self) -> &dyn WebContext {
        self.web.as_deref().expect("context not attached")
    }

    pub fn request_mut(&mut self) -> &mut dyn WebContext {
        self.web.as_deref_mut().expect("context not attached")
    }

    /// Take the web context back out after the response is written.
    pub fn detach_web(&mut self) -> Option<Box<dyn WebContext>> {
        self.web.take()
    }

    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    // -- Attribute bag ------------------------------------------------------

    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    /// Attributes coerced to strings, for backend headers and RPC
    /// attachments. String values pass through unquoted; everything else
    /// serializes compactly.
    #[must_use]
    pub fn attributes_as_strings(&self) -> HashMap<String, String> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.clone(), coerce_string(v)))
            .collect()
    }

    // -- Response -----------------------------------------------------------

    #[must_use]
    pub fn response(&self) -> &ResponseBuffer {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseBuffer {
        &mut self.response
    }
}

impl Default for GatewayContext {
    fn default() -> Self {
        Self::new()
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Pool of reusable request contexts.
///
/// The pool provides its own synchronization; callers must not retain a
/// reference after release. Growth is bounded so a burst does not pin
/// memory for the process lifetime.
pub struct ContextPool {
    idle: Mutex<Vec<Box<GatewayContext>>>,
    max_idle: usize,
}

impl ContextPool {
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    #[must_use]
    pub fn acquire(&self) -> Box<GatewayContext> {
        self.idle
            .lock()
            .pop()
            .unwrap_or_else(|| Box::new(GatewayContext::new()))
    }

    pub fn release(&self, mut ctx: Box<GatewayContext>) {
        ctx.release();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(ctx);
        }
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(256)
    }
}
