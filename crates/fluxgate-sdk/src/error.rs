use http::{HeaderMap, StatusCode};

/// Stable gateway error codes carried alongside the HTTP status.
pub mod codes {
    pub const GATEWAY_INTERNAL: &str = "GATEWAY:INTERNAL";
    pub const GATEWAY_BACKEND: &str = "GATEWAY:BACKEND";
    pub const GATEWAY_ENDPOINT: &str = "GATEWAY:ENDPOINT";
    pub const REQUEST_NOT_FOUND: &str = "REQUEST:NOT_FOUND";
    pub const REQUEST_INVALID: &str = "REQUEST:INVALID";
}

/// Structured error produced anywhere on the serving path.
///
/// Carries everything the response writer needs: the HTTP status, a stable
/// error code, a client-facing message, response headers accumulated before
/// the failure, and an optional internal cause that is logged but never sent
/// to the client.
#[derive(Debug, thiserror::Error)]
#[error("{error_code}: {message}")]
pub struct ServeError {
    pub status_code: StatusCode,
    pub error_code: &'static str,
    pub message: String,
    pub headers: Option<HeaderMap>,
    #[source]
    pub internal: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ServeError {
    #[must_use]
    pub fn new(status_code: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status_code,
            error_code,
            message: message.into(),
            headers: None,
            internal: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.internal = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// No endpoint registered for the requested version.
    #[must_use]
    pub fn endpoint_version_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            codes::GATEWAY_ENDPOINT,
            "ENDPOINT_VERSION_NOT_FOUND",
        )
    }

    /// No route registered for the request path.
    #[must_use]
    pub fn route_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            codes::REQUEST_NOT_FOUND,
            "ROUTE:NOT_FOUND",
        )
    }

    /// Wrap an arbitrary failure from the web adapter or a filter.
    #[must_use]
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::GATEWAY_INTERNAL,
            "GATEWAY:INTERNAL_ERROR",
        )
        .with_source(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_code_and_message() {
        let err = ServeError::endpoint_version_not_found();
        assert_eq!(err.to_string(), "GATEWAY:ENDPOINT: ENDPOINT_VERSION_NOT_FOUND");
        assert_eq!(err.status_code, StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_wraps_source() {
        let cause = std::io::Error::other("boom");
        let err = ServeError::internal(cause);
        assert_eq!(err.status_code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn headers_survive_attachment() {
        let mut headers = HeaderMap::new();
        headers.insert("x-flux-stage", "invoke".parse().unwrap());
        let err = ServeError::route_not_found().with_headers(headers);
        assert!(err.headers.unwrap().contains_key("x-flux-stage"));
    }
}
