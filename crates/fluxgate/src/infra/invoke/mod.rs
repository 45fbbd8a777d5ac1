use std::collections::HashMap;
use std::time::Duration;

use fluxgate_sdk::{Protocol, ServeError, codes};
use http::StatusCode;
use tracing::warn;

use crate::domain::ArcInvoker;

pub mod dubbo;
pub mod echo;
pub mod headers;
pub mod http_backend;

pub use dubbo::{DubboInvoker, GenericClient, GenericReference, ReferenceSpec, RpcError};
pub use echo::EchoInvoker;
pub use http_backend::HttpInvoker;

/// Deadline applied when an endpoint declares no (or an illegal) timeout.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal invokers keyed by upstream protocol, owned by the composition
/// root and selected per request by the router.
#[derive(Default)]
pub struct InvokerSet {
    by_protocol: HashMap<Protocol, ArcInvoker>,
}

impl InvokerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, protocol: Protocol, invoker: ArcInvoker) {
        self.by_protocol.insert(protocol, invoker);
    }

    #[must_use]
    pub fn select(&self, protocol: Protocol) -> Option<ArcInvoker> {
        self.by_protocol.get(&protocol).cloned()
    }

    /// Error returned when an endpoint names a protocol with no registered
    /// invoker.
    #[must_use]
    pub fn unknown_protocol(protocol: Protocol) -> ServeError {
        ServeError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::GATEWAY_INTERNAL,
            format!("UNKNOWN_PROTOCOL:{protocol}"),
        )
    }
}

/// Parse an endpoint's declared `rpc_timeout`, falling back to
/// [`DEFAULT_RPC_TIMEOUT`] on empty or illegal values.
#[must_use]
pub fn parse_rpc_timeout(raw: &str) -> Duration {
    if raw.is_empty() {
        return DEFAULT_RPC_TIMEOUT;
    }
    match parse_duration(raw) {
        Some(timeout) => timeout,
        None => {
            warn!(timeout = %raw, "illegal endpoint rpc-timeout, using default");
            DEFAULT_RPC_TIMEOUT
        }
    }
}

/// Parse duration text of the form `<number><unit>[...]`, e.g. `"50ms"`,
/// `"10s"`, `"1m30s"`. Units: ns, us, ms, s, m, h.
fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return None;
        }
        let number: f64 = rest[..digits_end].parse().ok()?;
        rest = &rest[digits_end..];
        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_secs = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        rest = &rest[unit_end..];
        total += Duration::from_secs_f64(number * unit_secs);
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_timeouts() {
        assert_eq!(parse_rpc_timeout("50ms"), Duration::from_millis(50));
        assert_eq!(parse_rpc_timeout("10s"), Duration::from_secs(10));
        assert_eq!(parse_rpc_timeout("1m30s"), Duration::from_secs(90));
        assert_eq!(parse_rpc_timeout("1.5s"), Duration::from_millis(1500));
    }

    #[test]
    fn illegal_timeouts_fall_back() {
        assert_eq!(parse_rpc_timeout(""), DEFAULT_RPC_TIMEOUT);
        assert_eq!(parse_rpc_timeout("fast"), DEFAULT_RPC_TIMEOUT);
        assert_eq!(parse_rpc_timeout("10"), DEFAULT_RPC_TIMEOUT);
        assert_eq!(parse_rpc_timeout("ms50"), DEFAULT_RPC_TIMEOUT);
    }

    #[test]
    fn unknown_protocol_is_internal_error() {
        let err = InvokerSet::unknown_protocol(Protocol::Grpc);
        assert_eq!(err.status_code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("GRPC"));
    }
}
