use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Shared enums
// ---------------------------------------------------------------------------

/// Upstream protocol an endpoint dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Dubbo,
    Grpc,
    Http,
    Echo,
}

impl Protocol {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Dubbo => "DUBBO",
            Protocol::Grpc => "GRPC",
            Protocol::Http => "HTTP",
            Protocol::Echo => "ECHO",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source location an argument's raw value is drawn from.
///
/// Decoding is total: unknown spellings become [`HttpScope::Auto`], which
/// probes the locations in a fixed fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum HttpScope {
    #[default]
    Auto,
    Attr,
    Attrs,
    Form,
    Header,
    Param,
    Path,
    Query,
}

impl From<String> for HttpScope {
    fn from(wire: String) -> Self {
        match wire.as_str() {
            "ATTR" => Self::Attr,
            "ATTRS" => Self::Attrs,
            "FORM" => Self::Form,
            "HEADER" => Self::Header,
            "PARAM" => Self::Param,
            "PATH" => Self::Path,
            "QUERY" => Self::Query,
            _ => Self::Auto,
        }
    }
}

/// Structural kind of an argument.
///
/// Records may carry kinds this build does not know; those decode as
/// [`ArgType::Other`] and are skipped (with a warning) during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum ArgType {
    Primitive,
    Complex,
    Other,
}

impl From<String> for ArgType {
    fn from(wire: String) -> Self {
        match wire.as_str() {
            "PRIMITIVE" => Self::Primitive,
            "COMPLEX" => Self::Complex,
            _ => Self::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// Argument
// ---------------------------------------------------------------------------

/// Declarative parameter descriptor for an endpoint.
///
/// Arguments form a tree: `Complex` nodes carry child descriptors in
/// `fields`, `Primitive` nodes carry none. Descriptors are immutable once
/// registered; resolved values are computed per request and never stored
/// here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argument {
    /// Declared wire type, e.g. `java.lang.String` or a class name.
    pub type_class: String,
    #[serde(default)]
    pub type_generic: Vec<String>,
    /// Name the upstream call knows this argument by.
    pub arg_name: String,
    pub arg_type: ArgType,
    /// Name the HTTP side binds the argument to.
    #[serde(default)]
    pub http_name: String,
    #[serde(default)]
    pub http_scope: HttpScope,
    /// Child descriptors; non-empty only for `Complex` arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Argument>,
}

impl Argument {
    fn primitive(type_class: &str, name: &str) -> Self {
        Self {
            type_class: type_class.to_string(),
            type_generic: Vec::new(),
            arg_name: name.to_string(),
            arg_type: ArgType::Primitive,
            http_name: name.to_string(),
            http_scope: HttpScope::Auto,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn string(name: &str) -> Self {
        Self::primitive("java.lang.String", name)
    }

    #[must_use]
    pub fn integer(name: &str) -> Self {
        Self::primitive("java.lang.Integer", name)
    }

    #[must_use]
    pub fn long(name: &str) -> Self {
        Self::primitive("java.lang.Long", name)
    }

    #[must_use]
    pub fn boolean(name: &str) -> Self {
        Self::primitive("java.lang.Boolean", name)
    }

    #[must_use]
    pub fn hash_map(name: &str) -> Self {
        Self::primitive("java.util.HashMap", name)
    }

    /// A `Complex` (POJO-like) argument; children go in `fields`.
    #[must_use]
    pub fn complex(type_class: &str, name: &str) -> Self {
        Self {
            type_class: type_class.to_string(),
            type_generic: Vec::new(),
            arg_name: name.to_string(),
            arg_type: ArgType::Complex,
            http_name: name.to_string(),
            http_scope: HttpScope::Auto,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: HttpScope) -> Self {
        self.http_scope = scope;
        self
    }

    #[must_use]
    pub fn with_http_name(mut self, name: &str) -> Self {
        self.http_name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Vec<Argument>) -> Self {
        self.fields = fields;
        self
    }
}

// ---------------------------------------------------------------------------
// Attribute bag
// ---------------------------------------------------------------------------

/// Open-ended named value attached to an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Value,
}

/// Attribute name carrying the legacy authorize flag.
pub const ATTR_AUTHORIZE: &str = "authorize";

/// Attribute name listing selective filter ids for an endpoint.
pub const ATTR_FILTERS: &str = "filters";

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Binding between an HTTP-side identity `(method, pattern, version)` and an
/// upstream call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default)]
    pub application: String,
    #[serde(default)]
    pub version: String,
    pub protocol: Protocol,
    #[serde(default)]
    pub rpc_group: String,
    #[serde(default)]
    pub rpc_version: String,
    /// Upstream call deadline, e.g. `"10s"` or `"50ms"`.
    #[serde(default)]
    pub rpc_timeout: String,
    #[serde(default)]
    pub rpc_retries: String,
    #[serde(default)]
    pub authorize: bool,
    #[serde(default)]
    pub upstream_host: String,
    /// Upstream URI: the interface name for RPC protocols, the path for HTTP.
    pub upstream_uri: String,
    #[serde(default)]
    pub upstream_method: String,
    pub http_pattern: String,
    pub http_method: String,
    #[serde(default)]
    pub arguments: Vec<Argument>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Endpoint {
    /// Structural validity of a registry record.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.http_method.is_empty()
            && !self.http_pattern.is_empty()
            && !self.upstream_uri.is_empty()
    }

    /// Identity of the upstream service this endpoint calls.
    #[must_use]
    pub fn service_id(&self) -> String {
        format!("{}:{}", self.upstream_uri, self.upstream_method)
    }

    /// First attribute with the given name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    /// Selective filter ids referenced by this endpoint, in declaration
    /// order. Accepts a JSON list of strings or a comma-separated string.
    #[must_use]
    pub fn filter_ids(&self) -> Vec<String> {
        match self.attribute(ATTR_FILTERS) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    Updated,
    Removed,
}

/// Endpoint change observed from the registry, consumed once by the router
/// engine's event loop.
#[derive(Debug, Clone)]
pub struct EndpointEvent {
    pub event_type: EventType,
    pub http_method: String,
    pub http_pattern: String,
    pub endpoint: Endpoint,
}

impl EndpointEvent {
    #[must_use]
    pub fn new(event_type: EventType, endpoint: Endpoint) -> Self {
        Self {
            event_type,
            http_method: endpoint.http_method.clone(),
            http_pattern: endpoint.http_pattern.clone(),
            endpoint,
        }
    }
}
