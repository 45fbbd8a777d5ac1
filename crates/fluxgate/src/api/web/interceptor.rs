use http::{HeaderMap, HeaderValue, Method};
use uuid::Uuid;

/// Header the gateway reports the request id back under.
pub const HEADER_X_REQUEST_ID: &str = "X-Request-Id";

/// Resolve the request id for an inbound request.
///
/// Probes the configured header names first, then the default, and
/// generates a UUID when the caller supplied none.
#[must_use]
pub fn resolve_request_id(headers: &HeaderMap, configured: &[String]) -> String {
    for name in configured {
        if let Some(value) = headers.get(name.as_str()).and_then(|v| v.to_str().ok())
            && !value.is_empty()
        {
            return value.to_string();
        }
    }
    if let Some(value) = headers
        .get(HEADER_X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        && !value.is_empty()
    {
        return value.to_string();
    }
    Uuid::new_v4().to_string()
}

/// Apply permissive CORS response headers.
pub fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, PUT, DELETE, HEAD, OPTIONS, PATCH"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("*"),
    );
}

/// Whether a request is a CORS preflight that should short-circuit with 204
/// instead of being routed.
#[must_use]
pub fn is_cors_preflight(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS && headers.contains_key("access-control-request-method")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_headers_probe_in_order() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", "trace-7".parse().unwrap());
        headers.insert(HEADER_X_REQUEST_ID, "fallback".parse().unwrap());

        let id = resolve_request_id(
            &headers,
            &["x-b3-traceid".to_string(), "x-trace-id".to_string()],
        );
        assert_eq!(id, "trace-7");
    }

    #[test]
    fn default_header_wins_over_generation() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_X_REQUEST_ID, "given".parse().unwrap());
        assert_eq!(resolve_request_id(&headers, &[]), "given");
    }

    #[test]
    fn missing_id_generates_one() {
        let a = resolve_request_id(&HeaderMap::new(), &[]);
        let b = resolve_request_id(&HeaderMap::new(), &[]);
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn preflight_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_cors_preflight(&Method::OPTIONS, &headers));
        headers.insert("access-control-request-method", "POST".parse().unwrap());
        assert!(is_cors_preflight(&Method::OPTIONS, &headers));
        assert!(!is_cors_preflight(&Method::GET, &headers));
    }
}
