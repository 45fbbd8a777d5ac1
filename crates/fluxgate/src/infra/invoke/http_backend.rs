use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fluxgate_sdk::{Endpoint, ServeError, codes};
use http::{HeaderValue, Method, StatusCode};

use crate::domain::{GatewayContext, Invoker, ResolverRegistry, assemble_form};

use super::headers::{sanitize_response_headers, strip_hop_by_hop};
use super::parse_rpc_timeout;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const BACKEND_USER_AGENT: &str = "FluxGo/Backend/v1";
const ERR_ASSEMBLE: &str = "HTTP_ASSEMBLE_FAILED";

/// Terminal invoker for `HTTP` endpoints: rewrites the inbound request onto
/// the upstream host, forwards it, and buffers the response.
///
/// Endpoints that declare arguments restrict what reaches the backend: the
/// assembled pairs ride the query string for GET and a form body otherwise.
/// Endpoints without arguments proxy the inbound body through untouched.
pub struct HttpInvoker {
    client: reqwest::Client,
    resolvers: Arc<ResolverRegistry>,
}

impl HttpInvoker {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(resolvers: Arc<ResolverRegistry>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            // Never follow redirects; the declared upstream is the target.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, resolvers })
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, ctx: &mut GatewayContext) -> Result<(), ServeError> {
        let endpoint = ctx.endpoint().clone();

        let method = upstream_method(&endpoint, ctx.request().method())
            .map_err(|detail| assemble_error(detail))?;
        let inbound_query = query_of(ctx.request().request_uri());

        let assembled = if endpoint.arguments.is_empty() {
            None
        } else {
            let pairs = assemble_form(&endpoint.arguments, ctx, &self.resolvers).map_err(|err| {
                ServeError::new(
                    StatusCode::BAD_REQUEST,
                    codes::REQUEST_INVALID,
                    "PARAMETERS:RESOLVE",
                )
                .with_source(err)
            })?;
            Some(
                form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish(),
            )
        };

        let (url, form_body) = build_forward_target(&endpoint, &method, inbound_query, assembled)
            .map_err(assemble_error)?;

        let mut out_headers = ctx.request().request_headers().clone();
        strip_hop_by_hop(&mut out_headers);
        out_headers.remove(http::header::HOST);
        out_headers.remove(http::header::CONTENT_LENGTH);
        for (name, value) in ctx.attributes_as_strings() {
            if let (Ok(n), Ok(v)) = (
                http::HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                out_headers.insert(n, v);
            }
        }
        if form_body.is_some() {
            out_headers.insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            );
        }
        out_headers.insert(
            http::header::USER_AGENT,
            HeaderValue::from_static(BACKEND_USER_AGENT),
        );

        let body: reqwest::Body = match form_body {
            Some(data) => data.into(),
            None => ctx.request().request_body().into(),
        };

        let timeout = parse_rpc_timeout(&endpoint.rpc_timeout);
        let send = self
            .client
            .request(method, &url)
            .headers(out_headers)
            .body(body)
            .send();

        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| remote_error(format!("timeout after {timeout:?} calling {url}")))?
            .map_err(|err| remote_error(err.to_string()).with_source(err))?;

        let status = response.status();
        let mut headers = response.headers().clone();
        sanitize_response_headers(&mut headers);
        let bytes = response
            .bytes()
            .await
            .map_err(|err| remote_error(err.to_string()).with_source(err))?;

        ctx.response_mut()
            .set_status(status)
            .set_headers(headers)
            .set_body(bytes);
        Ok(())
    }
}

fn upstream_method(endpoint: &Endpoint, inbound: &str) -> Result<Method, String> {
    let name = if endpoint.upstream_method.is_empty() {
        inbound
    } else {
        endpoint.upstream_method.as_str()
    };
    Method::from_bytes(name.to_uppercase().as_bytes())
        .map_err(|_| format!("illegal upstream method: {name}"))
}

/// Rewrite the inbound URL onto the upstream: `scheme://host/upstream_uri`,
/// preserving the inbound query. Assembled pairs extend the query for GET
/// and become the form body for every other method.
fn build_forward_target(
    endpoint: &Endpoint,
    method: &Method,
    inbound_query: &str,
    assembled: Option<String>,
) -> Result<(String, Option<String>), String> {
    let (scheme, host) = match endpoint.upstream_host.split_once("://") {
        Some((scheme, host)) => (scheme, host),
        None => ("http", endpoint.upstream_host.as_str()),
    };
    if host.is_empty() {
        return Err(format!(
            "endpoint has no upstream host: {}",
            endpoint.service_id()
        ));
    }

    let path = if endpoint.upstream_uri.starts_with('/') {
        endpoint.upstream_uri.clone()
    } else {
        format!("/{}", endpoint.upstream_uri)
    };

    let mut query = inbound_query.to_string();
    let mut form_body = None;
    if let Some(data) = assembled {
        if method == Method::GET {
            if query.is_empty() {
                query = data;
            } else {
                query.push('&');
                query.push_str(&data);
            }
        } else {
            form_body = Some(data);
        }
    }

    let mut url = format!("{scheme}://{host}{path}");
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query);
    }
    Ok((url, form_body))
}

fn query_of(request_uri: &str) -> &str {
    request_uri
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or("")
}

fn remote_error(detail: String) -> ServeError {
    ServeError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        codes::GATEWAY_BACKEND,
        format!("HTTPEX:REMOTE_ERROR:{detail}"),
    )
}

fn assemble_error(detail: String) -> ServeError {
    ServeError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        codes::GATEWAY_INTERNAL,
        format!("{ERR_ASSEMBLE}:{detail}"),
    )
}
