use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use fluxgate_sdk::{Endpoint, ServeError, codes};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::domain::{GatewayContext, Invoker, ResolverRegistry, assemble_invocation};

use super::parse_rpc_timeout;

const ERR_INVOKE: &str = "DUBBO_RPC:INVOKE";
const ERR_DECODE: &str = "DUBBO_RPC:DECODE";

/// Failure surfaced by a generic RPC client.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("invocation failed: {0}")]
    Invoke(String),
}

/// Parameters a client needs to build a reference to one backend interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    pub interface_name: String,
    pub group: String,
    pub version: String,
    pub retries: String,
}

impl ReferenceSpec {
    #[must_use]
    pub fn from_endpoint(endpoint: &Endpoint) -> Self {
        Self {
            interface_name: endpoint.upstream_uri.clone(),
            group: endpoint.rpc_group.clone(),
            version: endpoint.rpc_version.clone(),
            retries: endpoint.rpc_retries.clone(),
        }
    }
}

/// Client-side handle to one backend interface, supporting generic
/// invocation `(method, type names, values)` with string attachments.
#[async_trait]
pub trait GenericReference: Send + Sync {
    async fn invoke_generic(
        &self,
        method: &str,
        types: &[String],
        values: &[Value],
        attachments: HashMap<String, String>,
    ) -> Result<Value, RpcError>;
}

/// Factory for references. Service discovery behind the reference is the
/// client's concern, not the gateway's.
pub trait GenericClient: Send + Sync {
    fn create_reference(&self, spec: &ReferenceSpec) -> Arc<dyn GenericReference>;
}

/// Lazily built `interface → reference` cache. Entries are created once
/// under the lock and never evicted for the process lifetime; the backend
/// interface set is bounded by the endpoint table, so a removed endpoint
/// leaks at most one idle reference.
struct ReferenceCache {
    client: Arc<dyn GenericClient>,
    entries: Mutex<HashMap<String, Arc<dyn GenericReference>>>,
}

impl ReferenceCache {
    fn lookup(&self, endpoint: &Endpoint) -> Arc<dyn GenericReference> {
        let mut entries = self.entries.lock();
        if let Some(reference) = entries.get(&endpoint.upstream_uri) {
            return reference.clone();
        }
        debug!(interface = %endpoint.upstream_uri, "creating backend reference");
        let reference = self.client.create_reference(&ReferenceSpec::from_endpoint(endpoint));
        entries.insert(endpoint.upstream_uri.clone(), reference.clone());
        reference
    }
}

/// Terminal invoker for `DUBBO` endpoints: assembles the generic invocation
/// tuple, dispatches through a cached reference, and decodes the response
/// envelope into the context's response buffer.
pub struct DubboInvoker {
    cache: ReferenceCache,
    resolvers: Arc<ResolverRegistry>,
}

impl DubboInvoker {
    #[must_use]
    pub fn new(client: Arc<dyn GenericClient>, resolvers: Arc<ResolverRegistry>) -> Self {
        Self {
            cache: ReferenceCache {
                client,
                entries: Mutex::new(HashMap::new()),
            },
            resolvers,
        }
    }
}

#[async_trait]
impl Invoker for DubboInvoker {
    async fn invoke(&self, ctx: &mut GatewayContext) -> Result<(), ServeError> {
        let endpoint = ctx.endpoint().clone();
        let (types, values) =
            assemble_invocation(&endpoint.arguments, ctx, &self.resolvers).map_err(|err| {
                ServeError::new(
                    StatusCode::BAD_REQUEST,
                    codes::REQUEST_INVALID,
                    "PARAMETERS:RESOLVE",
                )
                .with_source(err)
            })?;

        let reference = self.cache.lookup(&endpoint);
        let attachments = ctx.attributes_as_strings();
        let timeout = parse_rpc_timeout(&endpoint.rpc_timeout);

        let reply = tokio::time::timeout(
            timeout,
            reference.invoke_generic(&endpoint.upstream_method, &types, &values, attachments),
        )
        .await
        .map_err(|elapsed| {
            ServeError::new(StatusCode::BAD_GATEWAY, codes::GATEWAY_BACKEND, ERR_INVOKE)
                .with_source(elapsed)
        })?
        .map_err(|err| {
            ServeError::new(StatusCode::BAD_GATEWAY, codes::GATEWAY_BACKEND, ERR_INVOKE)
                .with_source(err)
        })?;

        let (status, headers, body) = decode_envelope(reply).map_err(|err| {
            ServeError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::GATEWAY_BACKEND,
                ERR_DECODE,
            )
            .with_source(err)
        })?;

        ctx.response_mut()
            .set_status(status)
            .set_headers(headers)
            .set_body(body);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum EnvelopeError {
    #[error("illegal status code: {0}")]
    Status(String),
    #[error("headers must map names to strings")]
    Headers,
    #[error(transparent)]
    Body(#[from] serde_json::Error),
}

/// Decode a generic reply into `(status, headers, body)`.
///
/// An object carrying `status`/`headers`/`body` keys is an explicit
/// envelope; any other value is a bare 200 body.
fn decode_envelope(reply: Value) -> Result<(StatusCode, HeaderMap, Bytes), EnvelopeError> {
    let Value::Object(mut envelope) = reply else {
        return Ok((StatusCode::OK, json_headers(), value_bytes(reply)?));
    };
    if !envelope.contains_key("status")
        && !envelope.contains_key("headers")
        && !envelope.contains_key("body")
    {
        return Ok((
            StatusCode::OK,
            json_headers(),
            value_bytes(Value::Object(envelope))?,
        ));
    }

    let status = match envelope.get("status") {
        None => StatusCode::OK,
        Some(v) => {
            let code = v
                .as_u64()
                .and_then(|c| u16::try_from(c).ok())
                .ok_or_else(|| EnvelopeError::Status(v.to_string()))?;
            StatusCode::from_u16(code).map_err(|_| EnvelopeError::Status(v.to_string()))?
        }
    };

    let mut headers = HeaderMap::new();
    if let Some(header_obj) = envelope.get("headers") {
        let Value::Object(entries) = header_obj else {
            return Err(EnvelopeError::Headers);
        };
        for (name, value) in entries {
            let Some(text) = value.as_str() else {
                return Err(EnvelopeError::Headers);
            };
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(text),
            ) {
                headers.insert(n, v);
            }
        }
    }
    if !headers.contains_key(http::header::CONTENT_TYPE) {
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json;charset=UTF-8"),
        );
    }

    let body = value_bytes(envelope.remove("body").unwrap_or(Value::Null))?;
    Ok((status, headers, body))
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json;charset=UTF-8"),
    );
    headers
}

fn value_bytes(value: Value) -> Result<Bytes, serde_json::Error> {
    match value {
        Value::Null => Ok(Bytes::new()),
        Value::String(s) => Ok(Bytes::from(s)),
        other => Ok(Bytes::from(serde_json::to_vec(&other)?)),
    }
}
