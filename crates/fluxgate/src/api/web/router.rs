use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::MultiVersionEndpoint;

/// Sink for routes discovered from the registry. The event loop registers a
/// `(method, pattern)` exactly once, when the endpoint table reports that
/// the entry was newly created.
pub trait RouteRegistrar: Send + Sync {
    fn register_route(&self, method: &str, pattern: &str, mv: Arc<MultiVersionEndpoint>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

struct CompiledRoute {
    pattern: String,
    segments: Vec<Segment>,
    mv: Arc<MultiVersionEndpoint>,
}

/// Dynamic method/pattern matcher behind the catch-all axum handler.
///
/// axum's own router is immutable once built; registry events arrive while
/// serving, so route matching lives here behind a short read lock. Patterns
/// use `:name` segments for parameters and a trailing `*` to swallow the
/// rest of the path.
#[derive(Default)]
pub struct PatternRouter {
    by_method: RwLock<HashMap<String, Vec<CompiledRoute>>>,
}

impl PatternRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a request against the registered patterns, earliest
    /// registration first. Returns the endpoint set and the captured path
    /// parameters.
    #[must_use]
    pub fn match_route(
        &self,
        method: &str,
        path: &str,
    ) -> Option<(Arc<MultiVersionEndpoint>, HashMap<String, String>)> {
        let by_method = self.by_method.read();
        let routes = by_method.get(&method.to_uppercase())?;
        let parts: Vec<&str> = split_path(path);
        for route in routes {
            if let Some(params) = match_segments(&route.segments, &parts) {
                return Some((route.mv.clone(), params));
            }
        }
        None
    }

    /// Number of registered `(method, pattern)` routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.by_method.read().values().map(Vec::len).sum()
    }
}

impl RouteRegistrar for PatternRouter {
    fn register_route(&self, method: &str, pattern: &str, mv: Arc<MultiVersionEndpoint>) {
        let compiled = CompiledRoute {
            pattern: pattern.to_string(),
            segments: compile(pattern),
            mv,
        };
        let mut by_method = self.by_method.write();
        let routes = by_method.entry(method.to_uppercase()).or_default();
        match routes.iter_mut().find(|r| r.pattern == pattern) {
            Some(existing) => *existing = compiled,
            None => routes.push(compiled),
        }
    }
}

fn compile(pattern: &str) -> Vec<Segment> {
    split_path(pattern)
        .into_iter()
        .map(|part| {
            if part == "*" {
                Segment::Wildcard
            } else if let Some(name) = part.strip_prefix(':') {
                Segment::Param(name.to_string())
            } else {
                Segment::Literal(part.to_string())
            }
        })
        .collect()
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

fn match_segments(segments: &[Segment], parts: &[&str]) -> Option<HashMap<String, String>> {
    let mut params = HashMap::new();
    let mut index = 0;
    for segment in segments {
        match segment {
            Segment::Wildcard => return Some(params),
            Segment::Literal(literal) => {
                if parts.get(index) != Some(&literal.as_str()) {
                    return None;
                }
            }
            Segment::Param(name) => {
                let part = parts.get(index)?;
                params.insert(name.clone(), (*part).to_string());
            }
        }
        index += 1;
    }
    (index == parts.len()).then_some(params)
}
