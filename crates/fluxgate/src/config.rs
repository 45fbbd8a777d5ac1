use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// HTTP serving configuration, `http-server` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct HttpServerConfig {
    pub feature_debug_enable: bool,
    pub feature_cors_enable: bool,
    /// Header carrying the requested endpoint version.
    pub version_header: String,
    /// Headers probed, in order, for an inbound request id.
    pub request_id_headers: Vec<String>,
    pub request_log_enable: bool,
    pub address: String,
    pub port: u16,
    /// TLS serving is enabled when both files are set.
    pub tls_cert_file: String,
    pub tls_key_file: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            feature_debug_enable: false,
            feature_cors_enable: false,
            version_header: "X-Version".to_string(),
            request_id_headers: Vec::new(),
            request_log_enable: false,
            address: "0.0.0.0".to_string(),
            port: 8080,
            tls_cert_file: String::new(),
            tls_key_file: String::new(),
        }
    }
}

impl HttpServerConfig {
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        !self.tls_cert_file.is_empty() && !self.tls_key_file.is_empty()
    }
}

/// Registry backend selection, `registry` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RegistryConfig {
    /// Active backend id; `manifest` is the in-repo implementation.
    pub id: String,
    /// Directory of endpoint records for the manifest backend.
    pub manifest_dir: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            id: "manifest".to_string(),
            manifest_dir: "endpoints".to_string(),
        }
    }
}

/// Top-level gateway configuration.
///
/// Loading is hierarchical, later sources overriding earlier ones:
/// type defaults, then the file named by `CONFIG_PATH`, then environment
/// variables with the `FLUX__` prefix (`FLUX__HTTP_SERVER__PORT=9090`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct GatewayConfig {
    pub http_server: HttpServerConfig,
    pub registry: RegistryConfig,
}

impl GatewayConfig {
    /// # Errors
    ///
    /// Fails when the configuration file cannot be read or a value cannot
    /// be deserialized.
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Ok(path) = std::env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&path));
        }
        builder = builder.add_source(
            Environment::with_prefix("FLUX")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );
        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.http_server.version_header, "X-Version");
        assert_eq!(config.http_server.address, "0.0.0.0");
        assert_eq!(config.http_server.port, 8080);
        assert!(!config.http_server.feature_debug_enable);
        assert!(!config.http_server.tls_enabled());
        assert_eq!(config.registry.id, "manifest");
    }

    #[test]
    fn kebab_case_keys_deserialize() {
        let config: GatewayConfig = serde_json::from_value(serde_json::json!({
            "http-server": {
                "feature-debug-enable": true,
                "version-header": "X-Api-Version",
                "request-id-headers": ["X-Trace-Id"],
                "port": 9090
            }
        }))
        .unwrap();
        assert!(config.http_server.feature_debug_enable);
        assert_eq!(config.http_server.version_header, "X-Api-Version");
        assert_eq!(config.http_server.port, 9090);
        assert_eq!(config.http_server.request_id_headers, vec!["X-Trace-Id"]);
    }

    #[test]
    fn tls_requires_both_files() {
        let mut config = HttpServerConfig::default();
        config.tls_cert_file = "cert.pem".into();
        assert!(!config.tls_enabled());
        config.tls_key_file = "key.pem".into();
        assert!(config.tls_enabled());
    }
}
