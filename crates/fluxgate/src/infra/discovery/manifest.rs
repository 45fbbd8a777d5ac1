use std::path::PathBuf;

use async_trait::async_trait;
use fluxgate_sdk::EndpointEvent;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{NodeEventKind, RegistryBackend, decode_endpoint_event};

/// Registry backend that replays endpoint records from a directory of JSON
/// files as `Added` events.
///
/// Stands in for a remote registry during development and demos; each file
/// holds one endpoint record in the registry wire format. Files that fail
/// decoding are skipped with a warning, matching how a remote registry's
/// bad payloads are handled.
pub struct ManifestRegistry {
    dir: PathBuf,
}

impl ManifestRegistry {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl RegistryBackend for ManifestRegistry {
    async fn watch(&self, sink: mpsc::Sender<EndpointEvent>) -> anyhow::Result<()> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        // Deterministic replay order.
        files.sort();

        let mut published = 0usize;
        for path in files {
            let node = path.display().to_string();
            let payload = match tokio::fs::read(&path).await {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(node, error = %err, "manifest: cannot read endpoint file");
                    continue;
                }
            };
            if let Some(event) = decode_endpoint_event(&payload, NodeEventKind::Add, &node) {
                if sink.send(event).await.is_err() {
                    // Consumer gone; the gateway is shutting down.
                    return Ok(());
                }
                published += 1;
            }
        }
        info!(dir = %self.dir.display(), published, "manifest registry replayed");
        Ok(())
    }
}
