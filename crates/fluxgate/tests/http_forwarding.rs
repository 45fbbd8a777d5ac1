//! HTTP transport forwarding against a live mock upstream: transparent
//! passthrough, assembled parameters, attribute overlay, and deadline
//! enforcement.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::routing::any;
use fluxgate::domain::{ArcInvoker, Filter, GatewayContext, Invoker};
use fluxgate::{Endpoint, EndpointEvent, EventType, GatewayConfig, HttpGateway, ServeError};
use http::{Request, StatusCode};
use parking_lot::Mutex;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Mock upstream
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RecordedRequest {
    method: String,
    path: String,
    query: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

#[derive(Clone)]
struct MockState {
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn record(State(state): State<MockState>, request: Request<Body>) -> &'static str {
    let (parts, body) = request.into_parts();
    let slow = parts.uri.path().ends_with("/slow");
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    state.recorded.lock().push(RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().unwrap_or("").to_string(),
        headers: parts
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect(),
        body: body.to_vec(),
    });
    if slow {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    "upstream-ok"
}

struct MockUpstream {
    addr: SocketAddr,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockUpstream {
    async fn start() -> Self {
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            recorded: recorded.clone(),
        };
        let app = Router::new()
            .route("/{*path}", any(record))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, recorded }
    }

    fn host(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn last(&self) -> RecordedRequest {
        self.recorded.lock().last().cloned().expect("no request recorded")
    }

    fn header(&self, name: &str) -> Option<String> {
        self.last()
            .headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn http_endpoint(host: &str, uri: &str, pattern: &str) -> Endpoint {
    serde_json::from_value(serde_json::json!({
        "version": "1.0",
        "protocol": "HTTP",
        "upstreamHost": host,
        "upstreamUri": uri,
        "upstreamMethod": "GET",
        "httpPattern": pattern,
        "httpMethod": "GET"
    }))
    .unwrap()
}

fn added(endpoint: Endpoint) -> EndpointEvent {
    EndpointEvent::new(EventType::Added, endpoint)
}

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

async fn send(
    gateway: &HttpGateway,
    uri: &str,
    body: Body,
) -> axum::response::Response {
    gateway
        .app_router()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header("X-Version", "1.0")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn passthrough_preserves_query_and_body() {
    let upstream = MockUpstream::start().await;
    let gateway = HttpGateway::builder(GatewayConfig::default()).build().unwrap();
    gateway.handle_event(added(http_endpoint(&upstream.host(), "/api/list", "/proxy")));

    let response = send(&gateway, "/proxy?a=1&b=2", Body::from("raw-payload")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let seen = upstream.last();
    assert_eq!(seen.path, "/api/list");
    assert_eq!(seen.query, "a=1&b=2");
    assert_eq!(seen.body, b"raw-payload");
    assert_eq!(
        upstream.header("user-agent").as_deref(),
        Some("FluxGo/Backend/v1")
    );
}

#[tokio::test]
async fn declared_arguments_extend_the_query() {
    let upstream = MockUpstream::start().await;

    let mut endpoint = http_endpoint(&upstream.host(), "/api/find", "/find");
    endpoint.arguments = vec![serde_json::from_value(serde_json::json!({
        "typeClass": "java.lang.String",
        "argName": "name",
        "argType": "PRIMITIVE",
        "httpName": "name",
        "httpScope": "AUTO"
    }))
    .unwrap()];

    let gateway = HttpGateway::builder(GatewayConfig::default())
        .add_global_filter(Arc::new(InjectFilter {
            name: "name",
            value: serde_json::json!("bob"),
        }))
        .build()
        .unwrap();
    gateway.handle_event(added(endpoint));

    let response = send(&gateway, "/find?existing=1", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let seen = upstream.last();
    assert_eq!(seen.query, "existing=1&name=bob");
}

#[tokio::test]
async fn attributes_overlay_backend_headers() {
    let upstream = MockUpstream::start().await;
    let gateway = HttpGateway::builder(GatewayConfig::default())
        .add_global_filter(Arc::new(InjectFilter {
            name: "x-tenant",
            value: serde_json::json!("acme"),
        }))
        .build()
        .unwrap();
    gateway.handle_event(added(http_endpoint(&upstream.host(), "/api/list", "/proxy")));

    let response = send(&gateway, "/proxy", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(upstream.header("x-tenant").as_deref(), Some("acme"));
}

#[tokio::test]
async fn short_deadline_fails_slow_backend() {
    let upstream = MockUpstream::start().await;

    let mut endpoint = http_endpoint(&upstream.host(), "/api/slow", "/slow");
    endpoint.rpc_timeout = "50ms".to_string();
    let gateway = HttpGateway::builder(GatewayConfig::default()).build().unwrap();
    gateway.handle_event(added(endpoint));

    let response = send(&gateway, "/slow", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(
        payload["message"]
            .as_str()
            .unwrap()
            .starts_with("HTTPEX:REMOTE_ERROR:")
    );
}

#[tokio::test]
async fn unreachable_backend_classifies_as_remote_error() {
    // Reserved port with nothing listening.
    let gateway = HttpGateway::builder(GatewayConfig::default()).build().unwrap();
    let mut endpoint = http_endpoint("http://127.0.0.1:1", "/api/list", "/proxy");
    endpoint.rpc_timeout = "2s".to_string();
    gateway.handle_event(added(endpoint));

    let response = send(&gateway, "/proxy", Body::empty()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(payload["error-code"], "GATEWAY:BACKEND");
}
