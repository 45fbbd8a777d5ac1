//! Dynamic API gateway.
//!
//! Inbound HTTP requests resolve against a registry-driven, multi-version
//! endpoint table, pass through an ordered filter chain, and terminate in a
//! per-protocol transport invoker (Dubbo generic invocation, HTTP
//! forwarding, echo). Endpoint definitions arrive as registry events and
//! change while serving.
//!
//! [`HttpGateway`] is the composition root: it owns the endpoint table, the
//! filter lists, the value resolvers, the invoker set, and the web serving
//! surface. The pieces are exposed through [`domain`], [`infra`], and
//! [`api`] for embedders that need finer control.

// === PUBLIC API (from SDK) ===
pub use fluxgate_sdk::{
    ATTR_AUTHORIZE, ATTR_FILTERS, ArgType, Argument, Attribute, Endpoint, EndpointEvent,
    EventType, HttpScope, Protocol, ServeError, WebContext, codes,
};

// === GATEWAY ===
pub mod config;
pub mod server;
pub use config::{GatewayConfig, HttpServerConfig, RegistryConfig};
pub use server::{
    BackendService, ContextHook, DefaultResponseWriter, GatewayBuilder, GatewayResponseWriter,
    HttpGateway,
};

// === SUBSYSTEMS ===
pub mod api;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
