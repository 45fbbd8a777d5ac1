use std::sync::Arc;

use anyhow::Context;
use fluxgate::infra::discovery::ManifestRegistry;
use fluxgate::{GatewayConfig, HttpGateway};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = GatewayConfig::load().context("load gateway configuration")?;
    info!(?config, "configuration loaded");

    let registry = match config.registry.id.as_str() {
        "manifest" => Arc::new(ManifestRegistry::new(&config.registry.manifest_dir)),
        other => anyhow::bail!("unknown registry backend: {other}"),
    };

    let gateway = HttpGateway::builder(config)
        .with_registry(registry)
        .build()
        .context("build gateway")?;

    gateway.serve().await
}
