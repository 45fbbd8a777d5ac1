use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fluxgate_sdk::Endpoint;
use parking_lot::RwLock;

/// Key a route is stored under: `"{METHOD}#{pattern}"`.
#[must_use]
pub fn route_key(method: &str, pattern: &str) -> String {
    format!("{}#{}", method.to_uppercase(), pattern)
}

/// Set of endpoint variants sharing `(method, pattern)`, selected per
/// request by version.
///
/// An endpoint registered with an empty `version` acts as the default
/// variant when the request names no version and more than one exists.
pub struct MultiVersionEndpoint {
    versions: RwLock<HashMap<String, Arc<Endpoint>>>,
}

impl MultiVersionEndpoint {
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        let version = endpoint.version.clone();
        let mut versions = HashMap::new();
        versions.insert(version, Arc::new(endpoint));
        Self {
            versions: RwLock::new(versions),
        }
    }

    /// Insert or replace the variant for `version`.
    pub fn update(&self, version: &str, endpoint: Endpoint) {
        self.versions
            .write()
            .insert(version.to_string(), Arc::new(endpoint));
    }

    /// Remove the variant for `version`. The entry itself survives even when
    /// emptied, so a later `Added` event re-populates it without the route
    /// being registered twice.
    pub fn delete(&self, version: &str) {
        self.versions.write().remove(version);
    }

    /// Select the variant for a request version.
    ///
    /// A non-empty version matches exactly. An empty version selects the
    /// sole variant when only one exists, else the default (empty-version)
    /// variant, else nothing.
    #[must_use]
    pub fn find_by_version(&self, version: &str) -> Option<Arc<Endpoint>> {
        let versions = self.versions.read();
        if !version.is_empty() {
            return versions.get(version).cloned();
        }
        if versions.len() == 1 {
            return versions.values().next().cloned();
        }
        versions.get("").cloned()
    }

    /// An arbitrary variant; used by the debug surface for fields shared
    /// across versions.
    #[must_use]
    pub fn any(&self) -> Option<Arc<Endpoint>> {
        self.versions.read().values().next().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.read().is_empty()
    }

    /// Serializable view: version to endpoint.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, Endpoint> {
        self.versions
            .read()
            .iter()
            .map(|(v, ep)| (v.clone(), ep.as_ref().clone()))
            .collect()
    }
}

/// Process-wide `(method, pattern)` to multi-version endpoint table.
///
/// Readers outnumber writers by orders of magnitude; reads go through
/// dashmap shards without blocking the single event-loop writer.
#[derive(Default)]
pub struct EndpointTable {
    entries: DashMap<String, Arc<MultiVersionEndpoint>>,
}

impl EndpointTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entry for `(method, pattern)`, inserting a new one holding
    /// `endpoint` as its first variant when absent. `created == true` tells
    /// the caller to also register the HTTP route.
    pub fn load_or_store(
        &self,
        method: &str,
        pattern: &str,
        endpoint: &Endpoint,
    ) -> (Arc<MultiVersionEndpoint>, bool) {
        match self.entries.entry(route_key(method, pattern)) {
            Entry::Occupied(e) => (e.get().clone(), false),
            Entry::Vacant(e) => {
                let mv = Arc::new(MultiVersionEndpoint::new(endpoint.clone()));
                e.insert(mv.clone());
                (mv, true)
            }
        }
    }

    #[must_use]
    pub fn get(&self, method: &str, pattern: &str) -> Option<Arc<MultiVersionEndpoint>> {
        self.entries
            .get(&route_key(method, pattern))
            .map(|e| e.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time view for the debug surface.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Arc<MultiVersionEndpoint>)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(version: &str, uri: &str) -> Endpoint {
        serde_json::from_value(serde_json::json!({
            "version": version,
            "protocol": "HTTP",
            "upstreamUri": uri,
            "upstreamMethod": "GET",
            "httpPattern": "/users/:id",
            "httpMethod": "GET"
        }))
        .unwrap()
    }

    #[test]
    fn exact_version_match() {
        let mv = MultiVersionEndpoint::new(endpoint("1.0", "/a"));
        mv.update("2.0", endpoint("2.0", "/b"));

        assert_eq!(mv.find_by_version("1.0").unwrap().upstream_uri, "/a");
        assert_eq!(mv.find_by_version("2.0").unwrap().upstream_uri, "/b");
        assert!(mv.find_by_version("3.0").is_none());
    }

    #[test]
    fn empty_version_selects_sole_entry() {
        let mv = MultiVersionEndpoint::new(endpoint("1.0", "/a"));
        assert_eq!(mv.find_by_version("").unwrap().upstream_uri, "/a");
    }

    #[test]
    fn empty_version_with_many_entries_needs_default() {
        let mv = MultiVersionEndpoint::new(endpoint("1.0", "/a"));
        mv.update("2.0", endpoint("2.0", "/b"));
        assert!(mv.find_by_version("").is_none());

        mv.update("", endpoint("", "/default"));
        assert_eq!(mv.find_by_version("").unwrap().upstream_uri, "/default");
    }

    #[test]
    fn delete_keeps_entry_alive() {
        let mv = MultiVersionEndpoint::new(endpoint("1.0", "/a"));
        mv.delete("1.0");
        assert!(mv.is_empty());
        assert!(mv.find_by_version("1.0").is_none());

        mv.update("1.0", endpoint("1.0", "/again"));
        assert_eq!(mv.find_by_version("1.0").unwrap().upstream_uri, "/again");
    }

    #[test]
    fn load_or_store_reports_creation_once() {
        let table = EndpointTable::new();
        let ep = endpoint("1.0", "/a");

        let (_, created) = table.load_or_store("GET", "/users/:id", &ep);
        assert!(created);

        let ep2 = endpoint("2.0", "/b");
        let (mv, created) = table.load_or_store("GET", "/users/:id", &ep2);
        assert!(!created);
        // The second call must not have inserted its endpoint.
        assert_eq!(mv.len(), 1);
        assert!(mv.find_by_version("1.0").is_some());
    }

    #[test]
    fn route_key_uppercases_method() {
        assert_eq!(route_key("get", "/users"), "GET#/users");
    }
}
