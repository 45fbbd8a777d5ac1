use async_trait::async_trait;
use fluxgate_sdk::{ATTR_AUTHORIZE, Attribute, Endpoint, EndpointEvent, EventType};
use tokio::sync::mpsc;
use tracing::warn;

pub mod manifest;

pub use manifest::ManifestRegistry;

/// Raw change kind reported by a registry transport for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    Add,
    Delete,
    Update,
}

/// Source of endpoint events. Implementations watch their transport and
/// push decoded events into the sink; the gateway drains the sink with a
/// single consumer.
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    async fn watch(&self, sink: mpsc::Sender<EndpointEvent>) -> anyhow::Result<()>;
}

/// Smallest payload that can possibly hold an endpoint record.
const MIN_PAYLOAD: usize = b"{\"k\":0}".len();

/// Decode one registry payload into an endpoint event.
///
/// Payloads that are too small, not JSON-shaped, structurally invalid, or
/// semantically incomplete are rejected with a warning and yield `None`;
/// decode failures never become user-facing errors. Legacy records lacking
/// `attributes` get the authorize flag synthesized into the bag, so
/// consumers only ever see the attribute form.
#[must_use]
pub fn decode_endpoint_event(
    payload: &[u8],
    kind: NodeEventKind,
    node: &str,
) -> Option<EndpointEvent> {
    let size = payload.len();
    if size < MIN_PAYLOAD || (payload[0] != b'[' && payload[size - 1] != b'}') {
        warn!(node, size, "discovery: endpoint payload has illegal shape");
        return None;
    }

    let mut endpoint: Endpoint = match serde_json::from_slice(payload) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            warn!(node, error = %err, "discovery: endpoint payload is not valid JSON");
            return None;
        }
    };
    if !endpoint.is_valid() {
        warn!(node, "discovery: endpoint payload has invalid values");
        return None;
    }

    if endpoint.attributes.is_empty() {
        endpoint.attributes = vec![Attribute {
            name: ATTR_AUTHORIZE.to_string(),
            value: serde_json::Value::Bool(endpoint.authorize),
        }];
    }

    let event_type = match kind {
        NodeEventKind::Add => EventType::Added,
        NodeEventKind::Delete => EventType::Removed,
        NodeEventKind::Update => EventType::Updated,
    };
    Some(EndpointEvent::new(event_type, endpoint))
}
