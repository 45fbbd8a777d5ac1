use async_trait::async_trait;
use bytes::Bytes;
use fluxgate_sdk::ServeError;
use http::{HeaderValue, StatusCode};
use serde_json::Value;

use crate::domain::{GatewayContext, Invoker};

/// Terminal invoker for `ECHO` endpoints: reflects the inbound request back
/// as JSON. Useful for wiring checks and demos; no backend involved.
pub struct EchoInvoker;

#[async_trait]
impl Invoker for EchoInvoker {
    async fn invoke(&self, ctx: &mut GatewayContext) -> Result<(), ServeError> {
        let request = ctx.request();
        let headers: serde_json::Map<String, Value> = request
            .request_headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
            })
            .collect();
        let attributes: serde_json::Map<String, Value> = ctx
            .attributes()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let reflection = serde_json::json!({
            "method": request.method(),
            "host": request.host(),
            "uri": request.request_uri(),
            "headers": headers,
            "attributes": attributes,
            "endpoint": ctx.endpoint().service_id(),
        });
        let body = serde_json::to_vec(&reflection).map_err(ServeError::internal)?;

        let response = ctx.response_mut();
        response.set_status(StatusCode::OK).set_body(Bytes::from(body));
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json;charset=UTF-8"),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fluxgate_sdk::Endpoint;

    use super::*;
    use crate::test_support::MockWebContext;

    #[tokio::test]
    async fn reflects_request_shape() {
        let endpoint: Endpoint = serde_json::from_value(serde_json::json!({
            "protocol": "ECHO",
            "upstreamUri": "echo",
            "upstreamMethod": "echo",
            "httpPattern": "/echo",
            "httpMethod": "GET"
        }))
        .unwrap();

        let mut ctx = GatewayContext::new();
        ctx.attach(
            "req-echo",
            Box::new(MockWebContext::new().with_header("x-caller", "test")),
            Arc::new(endpoint),
        );
        ctx.set_attribute("tenant", serde_json::json!("acme"));

        EchoInvoker.invoke(&mut ctx).await.unwrap();

        let body: Value = serde_json::from_slice(ctx.response().body()).unwrap();
        assert_eq!(body["method"], "GET");
        assert_eq!(body["headers"]["x-caller"], "test");
        assert_eq!(body["attributes"]["tenant"], "acme");
        assert_eq!(ctx.response().status(), StatusCode::OK);
    }
}
