use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::routing::any;
use bytes::Bytes;
use dashmap::DashMap;
use fluxgate_sdk::{Endpoint, EndpointEvent, EventType, Protocol, ServeError, WebContext, codes};
use futures_util::FutureExt;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::debug::{DebugState, debug_router};
use crate::api::web::interceptor::{
    HEADER_X_REQUEST_ID, apply_cors_headers, is_cors_preflight, resolve_request_id,
};
use crate::api::web::{AxumWebContext, PatternRouter, RouteRegistrar};
use crate::config::GatewayConfig;
use crate::domain::{
    ContextPool, EndpointTable, Filter, FilterRegistry, GatewayContext, ResolverRegistry,
};
use crate::infra::discovery::RegistryBackend;
use crate::infra::invoke::{DubboInvoker, EchoInvoker, GenericClient, HttpInvoker, InvokerSet};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

const ALLOWED_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "TRACE",
];

fn is_allowed_method(method: &str) -> bool {
    ALLOWED_METHODS.contains(&method)
}

/// Bridges adapter state into the gateway context before the chain runs.
pub type ContextHook = Arc<dyn Fn(&mut GatewayContext) + Send + Sync>;

// ---------------------------------------------------------------------------
// Backend service view
// ---------------------------------------------------------------------------

/// Upstream call view derived from endpoints, keyed by service id for the
/// debug surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendService {
    pub service_id: String,
    pub application: String,
    pub protocol: Protocol,
    pub upstream_host: String,
    pub upstream_uri: String,
    pub upstream_method: String,
    pub rpc_group: String,
    pub rpc_version: String,
    pub rpc_timeout: String,
    pub rpc_retries: String,
}

impl From<&Endpoint> for BackendService {
    fn from(endpoint: &Endpoint) -> Self {
        Self {
            service_id: endpoint.service_id(),
            application: endpoint.application.clone(),
            protocol: endpoint.protocol,
            upstream_host: endpoint.upstream_host.clone(),
            upstream_uri: endpoint.upstream_uri.clone(),
            upstream_method: endpoint.upstream_method.clone(),
            rpc_group: endpoint.rpc_group.clone(),
            rpc_version: endpoint.rpc_version.clone(),
            rpc_timeout: endpoint.rpc_timeout.clone(),
            rpc_retries: endpoint.rpc_retries.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Response writer
// ---------------------------------------------------------------------------

/// Writes chain outcomes through the web capability contract.
pub trait GatewayResponseWriter: Send + Sync {
    /// # Errors
    ///
    /// Propagates adapter write failures.
    fn write_body(
        &self,
        web: &mut dyn WebContext,
        request_id: &str,
        headers: &HeaderMap,
        status: StatusCode,
        body: Bytes,
    ) -> Result<(), ServeError>;

    /// # Errors
    ///
    /// Propagates adapter write failures.
    fn write_error(
        &self,
        web: &mut dyn WebContext,
        request_id: &str,
        headers: &HeaderMap,
        err: &ServeError,
    ) -> Result<(), ServeError>;
}

pub struct DefaultResponseWriter;

impl GatewayResponseWriter for DefaultResponseWriter {
    fn write_body(
        &self,
        web: &mut dyn WebContext,
        request_id: &str,
        headers: &HeaderMap,
        status: StatusCode,
        body: Bytes,
    ) -> Result<(), ServeError> {
        let out = web.response_headers_mut();
        for (name, value) in headers {
            out.append(name, value.clone());
        }
        if let Ok(id) = HeaderValue::from_str(request_id) {
            out.insert(HEADER_X_REQUEST_ID, id);
        }
        web.response_write(status, body)
    }

    fn write_error(
        &self,
        web: &mut dyn WebContext,
        request_id: &str,
        headers: &HeaderMap,
        err: &ServeError,
    ) -> Result<(), ServeError> {
        let body = serialize_error(err);
        let out = web.response_headers_mut();
        for (name, value) in headers {
            out.append(name, value.clone());
        }
        out.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json;charset=UTF-8"),
        );
        if let Ok(id) = HeaderValue::from_str(request_id) {
            out.insert(HEADER_X_REQUEST_ID, id);
        }
        web.response_write(err.status_code, body)
    }
}

fn serialize_error(err: &ServeError) -> Bytes {
    let payload = serde_json::json!({
        "status": "error",
        "error-code": err.error_code,
        "message": err.message,
    });
    Bytes::from(payload.to_string())
}

// ---------------------------------------------------------------------------
// Event application
// ---------------------------------------------------------------------------

/// Apply one registry event to the endpoint table, the backend service
/// view, and (for newly created routes) the route registrar.
pub(crate) fn apply_endpoint_event(
    table: &EndpointTable,
    registrar: &dyn RouteRegistrar,
    services: &DashMap<String, BackendService>,
    event: EndpointEvent,
) {
    let method = event.http_method.to_uppercase();
    if !is_allowed_method(&method) {
        warn!(method = %event.http_method, "ignoring unsupported http method");
        return;
    }

    let endpoint = event.endpoint;
    let (mv, created) = table.load_or_store(&method, &event.http_pattern, &endpoint);
    match event.event_type {
        EventType::Added => {
            info!(
                version = %endpoint.version,
                method = %method,
                pattern = %event.http_pattern,
                "new endpoint"
            );
            services.insert(endpoint.service_id(), BackendService::from(&endpoint));
            let version = endpoint.version.clone();
            mv.update(&version, endpoint);
            if created {
                info!(method = %method, pattern = %event.http_pattern, "register http route");
                registrar.register_route(&method, &event.http_pattern, mv);
            }
        }
        EventType::Updated => {
            info!(
                version = %endpoint.version,
                method = %method,
                pattern = %event.http_pattern,
                "update endpoint"
            );
            services.insert(endpoint.service_id(), BackendService::from(&endpoint));
            let version = endpoint.version.clone();
            mv.update(&version, endpoint);
        }
        EventType::Removed => {
            info!(method = %method, pattern = %event.http_pattern, "delete endpoint");
            services.remove(&endpoint.service_id());
            mv.delete(&endpoint.version);
        }
    }
}

async fn run_event_loop(shared: Arc<GatewayShared>, mut events: mpsc::Receiver<EndpointEvent>) {
    while let Some(event) = events.recv().await {
        apply_endpoint_event(
            &shared.table,
            shared.router.as_ref(),
            &shared.services,
            event,
        );
    }
    info!("registry event loop stopped");
}

// ---------------------------------------------------------------------------
// Shared serving state
// ---------------------------------------------------------------------------

pub(crate) struct GatewayShared {
    pub(crate) table: Arc<EndpointTable>,
    pub(crate) services: Arc<DashMap<String, BackendService>>,
    pub(crate) router: Arc<PatternRouter>,
    pub(crate) filters: FilterRegistry,
    pub(crate) invokers: InvokerSet,
    pub(crate) pool: ContextPool,
    pub(crate) hooks: Vec<ContextHook>,
    pub(crate) writer: Arc<dyn GatewayResponseWriter>,
    pub(crate) version_header: String,
    pub(crate) request_id_headers: Vec<String>,
    pub(crate) request_log_enable: bool,
    pub(crate) cors_enable: bool,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

async fn dispatch(State(shared): State<Arc<GatewayShared>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let request_id = resolve_request_id(&parts.headers, &shared.request_id_headers);

    if shared.cors_enable && is_cors_preflight(&parts.method, &parts.headers) {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(err) => {
            let serve_err = ServeError::internal(err);
            return plain_error_response(&shared, &request_id, &serve_err);
        }
    };

    let path = parts.uri.path().to_string();
    let Some((mv, path_params)) = shared.router.match_route(parts.method.as_str(), &path) else {
        if shared.request_log_enable {
            info!(request_id = %request_id, method = %parts.method, path = %path, "routing: ROUTE_NOT_FOUND");
        }
        return plain_error_response(&shared, &request_id, &ServeError::route_not_found());
    };

    let version = parts
        .headers
        .get(shared.version_header.as_str())
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let Some(endpoint) = mv.find_by_version(&version) else {
        if shared.request_log_enable {
            info!(
                request_id = %request_id,
                method = %parts.method,
                path = %path,
                version = %version,
                "routing: ENDPOINT_VERSION_NOT_FOUND"
            );
        }
        return plain_error_response(
            &shared,
            &request_id,
            &ServeError::endpoint_version_not_found(),
        );
    };

    if shared.request_log_enable {
        info!(
            request_id = %request_id,
            method = %parts.method,
            path = %path,
            version = %version,
            endpoint = %endpoint.service_id(),
            "routing: dispatching"
        );
    }

    let web = AxumWebContext::new(parts, body, path_params);
    let mut ctx = shared.pool.acquire();
    ctx.attach(request_id.clone(), Box::new(web), endpoint.clone());
    for hook in &shared.hooks {
        hook(&mut ctx);
    }

    let mut selected: Vec<Arc<dyn Filter>> = Vec::new();
    for filter_id in endpoint.filter_ids() {
        match shared.filters.selective_by_id(&filter_id) {
            Some(filter) => selected.push(filter),
            None => warn!(filter = %filter_id, "selective filter not registered, skipping"),
        }
    }

    let result = match shared.invokers.select(endpoint.protocol) {
        None => Err(InvokerSet::unknown_protocol(endpoint.protocol)),
        Some(terminal) => {
            let chain = shared.filters.build_chain(&selected, terminal);
            match AssertUnwindSafe(chain.invoke(&mut ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    error!(
                        request_id = %request_id,
                        panic = %panic_message(&panic),
                        "dispatch: unexpected panic"
                    );
                    Err(ServeError::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        codes::GATEWAY_INTERNAL,
                        "GATEWAY:INTERNAL_ERROR",
                    ))
                }
            }
        }
    };

    let write_outcome = match result {
        Ok(()) => {
            let (status, headers, body) = {
                let response = ctx.response();
                (
                    response.status(),
                    response.headers().clone(),
                    response.body().clone(),
                )
            };
            shared
                .writer
                .write_body(ctx.request_mut(), &request_id, &headers, status, body)
        }
        Err(err) => {
            // Headers accumulated on the context before the failure survive
            // into the error response.
            let mut headers = ctx.response().headers().clone();
            if let Some(extra) = &err.headers {
                for (name, value) in extra {
                    headers.append(name, value.clone());
                }
            }
            if let Some(source) = &err.internal {
                warn!(request_id = %request_id, error = %err, source = %source, "serve error");
            }
            shared
                .writer
                .write_error(ctx.request_mut(), &request_id, &headers, &err)
        }
    };
    if let Err(write_err) = write_outcome {
        error!(request_id = %request_id, error = %write_err, "response write failed");
    }

    let mut web = ctx.detach_web();
    shared.pool.release(ctx);

    let written = web
        .as_deref_mut()
        .and_then(|w| w.as_any_mut().downcast_mut::<AxumWebContext>())
        .and_then(AxumWebContext::take_response);
    match written {
        Some((status, headers, body)) => {
            let mut response = Response::new(axum::body::Body::from(body));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            if shared.cors_enable {
                apply_cors_headers(response.headers_mut());
            }
            response
        }
        None => {
            let mut response = Response::new(axum::body::Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn plain_error_response(shared: &GatewayShared, request_id: &str, err: &ServeError) -> Response {
    let mut response = Response::new(axum::body::Body::from(serialize_error(err)));
    *response.status_mut() = err.status_code;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json;charset=UTF-8"),
    );
    if let Ok(id) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(HEADER_X_REQUEST_ID, id);
    }
    if shared.cors_enable {
        apply_cors_headers(response.headers_mut());
    }
    response
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// The gateway composition root: owns the endpoint table, filter lists,
/// value resolvers, invoker set, and the web serving surface.
pub struct HttpGateway {
    shared: Arc<GatewayShared>,
    config: GatewayConfig,
    registry: Option<Arc<dyn RegistryBackend>>,
}

impl HttpGateway {
    #[must_use]
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// The axum application serving the gateway: a catch-all dispatch
    /// handler plus, when enabled, the debug query surface.
    #[must_use]
    pub fn app_router(&self) -> Router {
        let mut router = Router::new()
            .route("/", any(dispatch))
            .route("/{*path}", any(dispatch))
            .with_state(self.shared.clone());
        if self.config.http_server.feature_debug_enable {
            router = router.merge(debug_router(DebugState {
                table: self.shared.table.clone(),
                services: self.shared.services.clone(),
            }));
        }
        router
    }

    /// Apply one endpoint event directly, bypassing the registry channel.
    /// Embedding applications and tests use this to seed routes.
    pub fn handle_event(&self, event: EndpointEvent) {
        apply_endpoint_event(
            &self.shared.table,
            self.shared.router.as_ref(),
            &self.shared.services,
            event,
        );
    }

    #[must_use]
    pub fn endpoint_table(&self) -> Arc<EndpointTable> {
        self.shared.table.clone()
    }

    /// Serve until interrupted (SIGINT).
    ///
    /// # Errors
    ///
    /// Fails when no registry backend is configured, the address cannot be
    /// bound, or TLS material cannot be loaded.
    pub async fn serve(self) -> anyhow::Result<()> {
        self.serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Serve until `shutdown` resolves, then stop the registry watcher and
    /// drain the web server gracefully.
    ///
    /// # Errors
    ///
    /// Fails when no registry backend is configured, the address cannot be
    /// bound, or TLS material cannot be loaded.
    pub async fn serve_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let registry = self
            .registry
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no registry backend configured"))?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let watch = tokio::spawn({
            let registry = registry.clone();
            async move {
                if let Err(err) = registry.watch(events_tx).await {
                    error!(error = %err, "registry watch failed");
                }
            }
        });
        let event_loop = tokio::spawn(run_event_loop(self.shared.clone(), events_rx));

        let app = self.app_router();
        let http = &self.config.http_server;
        let bind = http.bind_address();

        if http.tls_enabled() {
            info!(address = %bind, "HttpServer (TLS) starting");
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &http.tls_cert_file,
                &http.tls_key_file,
            )
            .await?;
            let handle = axum_server::Handle::new();
            tokio::spawn({
                let handle = handle.clone();
                async move {
                    shutdown.await;
                    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
                }
            });
            axum_server::bind_rustls(bind.parse()?, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        } else {
            info!(address = %bind, "HttpServer starting");
            let listener = tokio::net::TcpListener::bind(&bind).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await?;
        }

        info!("HttpServer shutdown");
        watch.abort();
        event_loop.abort();
        Ok(())
    }
}

/// Builder wiring registries, filters, resolvers, and transport clients
/// into an [`HttpGateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    registry: Option<Arc<dyn RegistryBackend>>,
    generic_client: Option<Arc<dyn GenericClient>>,
    filters: FilterRegistry,
    resolvers: ResolverRegistry,
    hooks: Vec<ContextHook>,
    writer: Arc<dyn GatewayResponseWriter>,
}

impl GatewayBuilder {
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            registry: None,
            generic_client: None,
            filters: FilterRegistry::new(),
            resolvers: ResolverRegistry::with_builtins(),
            hooks: Vec::new(),
            writer: Arc::new(DefaultResponseWriter),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn RegistryBackend>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Enable the `DUBBO` protocol by supplying a generic RPC client.
    #[must_use]
    pub fn with_generic_client(mut self, client: Arc<dyn GenericClient>) -> Self {
        self.generic_client = Some(client);
        self
    }

    #[must_use]
    pub fn add_global_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.add_global(filter);
        self
    }

    #[must_use]
    pub fn add_selective_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.add_selective(filter);
        self
    }

    #[must_use]
    pub fn register_resolver(mut self, type_class: &str, resolver: crate::domain::ResolveFn) -> Self {
        self.resolvers.register(type_class, resolver);
        self
    }

    #[must_use]
    pub fn add_context_hook(mut self, hook: ContextHook) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_response_writer(mut self, writer: Arc<dyn GatewayResponseWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// # Errors
    ///
    /// Fails when the HTTP backend client cannot be constructed.
    pub fn build(self) -> anyhow::Result<HttpGateway> {
        let resolvers = Arc::new(self.resolvers);

        let mut invokers = InvokerSet::new();
        invokers.register(
            Protocol::Http,
            Arc::new(HttpInvoker::new(resolvers.clone())?),
        );
        invokers.register(Protocol::Echo, Arc::new(EchoInvoker));
        if let Some(client) = self.generic_client {
            invokers.register(
                Protocol::Dubbo,
                Arc::new(DubboInvoker::new(client, resolvers.clone())),
            );
        }

        let http = &self.config.http_server;
        let shared = Arc::new(GatewayShared {
            table: Arc::new(EndpointTable::new()),
            services: Arc::new(DashMap::new()),
            router: Arc::new(PatternRouter::new()),
            filters: self.filters,
            invokers,
            pool: ContextPool::default(),
            hooks: self.hooks,
            writer: self.writer,
            version_header: http.version_header.clone(),
            request_id_headers: http.request_id_headers.clone(),
            request_log_enable: http.request_log_enable,
            cors_enable: http.feature_cors_enable,
        });

        Ok(HttpGateway {
            shared,
            config: self.config,
            registry: self.registry,
        })
    }
}
