//! End-to-end dispatch through the gateway's serving surface: routing,
//! version selection, filter chains, the echo transport, and the debug
//! query endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use fluxgate::domain::{ArcInvoker, Filter, GatewayContext, Invoker};
use fluxgate::{
    Endpoint, EndpointEvent, EventType, GatewayConfig, HttpGateway, ServeError,
};
use http::{Request, StatusCode};
use tower::ServiceExt;

fn echo_endpoint(version: &str, pattern: &str) -> Endpoint {
    serde_json::from_value(serde_json::json!({
        "application": "demo",
        "version": version,
        "protocol": "ECHO",
        "upstreamUri": "echo.service",
        "upstreamMethod": "reflect",
        "httpPattern": pattern,
        "httpMethod": "GET"
    }))
    .unwrap()
}

fn added(endpoint: Endpoint) -> EndpointEvent {
    EndpointEvent::new(EventType::Added, endpoint)
}

fn debug_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.http_server.feature_debug_enable = true;
    config
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn routes_echo_endpoint_by_version() {
    let gateway = HttpGateway::builder(GatewayConfig::default()).build().unwrap();
    gateway.handle_event(added(echo_endpoint("1.0", "/echo/:name")));

    let response = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/echo/world?verbose=1")
                .header("X-Version", "1.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("X-Request-Id"));
    let payload = body_json(response).await;
    assert_eq!(payload["method"], "GET");
    assert_eq!(payload["uri"], "/echo/world?verbose=1");
    assert_eq!(payload["endpoint"], "echo.service:reflect");
}

#[tokio::test]
async fn sole_version_serves_requests_without_header() {
    let gateway = HttpGateway::builder(GatewayConfig::default()).build().unwrap();
    gateway.handle_event(added(echo_endpoint("2.0", "/echo")));

    let response = gateway
        .app_router()
        .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_version_yields_endpoint_not_found() {
    let gateway = HttpGateway::builder(GatewayConfig::default()).build().unwrap();
    gateway.handle_event(added(echo_endpoint("1.0", "/echo")));
    gateway.handle_event(added(echo_endpoint("2.0", "/echo")));

    let response = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/echo")
                .header("X-Version", "9.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = body_json(response).await;
    assert_eq!(payload["message"], "ENDPOINT_VERSION_NOT_FOUND");
}

#[tokio::test]
async fn unknown_path_yields_route_not_found() {
    let gateway = HttpGateway::builder(GatewayConfig::default()).build().unwrap();

    let response = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/nothing/here")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = body_json(response).await;
    assert_eq!(payload["message"], "ROUTE:NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Filters through dispatch
// ---------------------------------------------------------------------------

struct InjectFilter {
    name: &'static str,
    value: serde_json::Value,
}

struct InjectStep {
    name: &'static str,
    value: serde_json::Value,
    next: ArcInvoker,
}

#[async_trait]
impl Invoker for InjectStep {
    async fn invoke(&self, ctx: &mut GatewayContext) -> Result<(), ServeError> {
        ctx.set_attribute(self.name, self.value.clone());
        self.next.invoke(ctx).await
    }
}

impl Filter for InjectFilter {
    fn type_id(&self) -> &str {
        "Inject"
    }

    fn invoke(&self, next: ArcInvoker) -> ArcInvoker {
        Arc::new(InjectStep {
            name: self.name,
            value: self.value.clone(),
            next,
        })
    }
}

struct DenyFilter;

impl Filter for DenyFilter {
    fn type_id(&self) -> &str {
        "Deny"
    }

    fn invoke(&self, _next: ArcInvoker) -> ArcInvoker {
        struct Step;
        #[async_trait]
        impl Invoker for Step {
            async fn invoke(&self, _ctx: &mut GatewayContext) -> Result<(), ServeError> {
                Err(ServeError::new(
                    StatusCode::UNAUTHORIZED,
                    fluxgate::codes::REQUEST_INVALID,
                    "AUTHORIZATION:DENIED",
                ))
            }
        }
        Arc::new(Step)
    }
}

#[tokio::test]
async fn global_filter_attributes_reach_the_transport() {
    let gateway = HttpGateway::builder(GatewayConfig::default())
        .add_global_filter(Arc::new(InjectFilter {
            name: "tenant",
            value: serde_json::json!("acme"),
        }))
        .build()
        .unwrap();
    gateway.handle_event(added(echo_endpoint("1.0", "/echo")));

    let response = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/echo")
                .header("X-Version", "1.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let payload = body_json(response).await;
    assert_eq!(payload["attributes"]["tenant"], "acme");
}

#[tokio::test]
async fn selective_filter_applies_only_when_referenced() {
    let gateway = HttpGateway::builder(GatewayConfig::default())
        .add_selective_filter(Arc::new(DenyFilter))
        .build()
        .unwrap();

    let mut guarded = echo_endpoint("1.0", "/guarded");
    guarded.attributes = vec![fluxgate::Attribute {
        name: fluxgate::ATTR_FILTERS.to_string(),
        value: serde_json::json!(["Deny"]),
    }];
    gateway.handle_event(added(guarded));
    gateway.handle_event(added(echo_endpoint("1.0", "/open")));

    let denied = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/guarded")
                .header("X-Version", "1.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    let payload = body_json(denied).await;
    assert_eq!(payload["message"], "AUTHORIZATION:DENIED");

    let open = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/open")
                .header("X-Version", "1.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(open.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Debug surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn debug_endpoints_lists_and_filters() {
    let gateway = HttpGateway::builder(debug_config()).build().unwrap();
    gateway.handle_event(added(echo_endpoint("1.0", "/echo")));

    let all = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/debug/endpoints")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(all.status(), StatusCode::OK);
    assert_eq!(
        all.headers().get("content-type").unwrap(),
        "application/json;charset=UTF-8"
    );
    let payload = body_json(all).await;
    assert!(payload.as_object().unwrap().contains_key("GET#/echo"));

    let filtered = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/debug/endpoints?application=demo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let payload = body_json(filtered).await;
    assert_eq!(payload.as_array().unwrap().len(), 1);

    let none = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/debug/endpoints?application=absent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let payload = body_json(none).await;
    assert!(payload.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn debug_services_finds_by_service_id() {
    let gateway = HttpGateway::builder(debug_config()).build().unwrap();
    gateway.handle_event(added(echo_endpoint("1.0", "/echo")));

    let found = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/debug/services?serviceId=echo.service:reflect")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let payload = body_json(found).await;
    assert_eq!(payload["serviceId"], "echo.service:reflect");
    assert_eq!(payload["protocol"], "ECHO");

    let missing = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/debug/services?serviceId=ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let payload = body_json(missing).await;
    assert_eq!(payload["status"], "failed");
}

#[tokio::test]
async fn debug_surface_absent_by_default() {
    let gateway = HttpGateway::builder(GatewayConfig::default()).build().unwrap();

    let response = gateway
        .app_router()
        .oneshot(
            Request::builder()
                .uri("/debug/endpoints")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Falls through to the dispatch catch-all, which knows no such route.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = body_json(response).await;
    assert_eq!(payload["message"], "ROUTE:NOT_FOUND");
}
