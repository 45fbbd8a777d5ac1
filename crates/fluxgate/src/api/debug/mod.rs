//! Read-only JSON query surface over the live endpoint table and the
//! backend service view. Operability only; never on the serving path.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use dashmap::DashMap;
use fluxgate_sdk::Endpoint;
use http::{HeaderValue, StatusCode};
use serde::Serialize;

use crate::domain::{EndpointTable, MultiVersionEndpoint};
use crate::server::BackendService;

const CONTENT_TYPE_JSON: &str = "application/json;charset=UTF-8";

const QUERY_KEY_APPLICATION: &str = "application";
const QUERY_KEY_PROTOCOL: &str = "protocol";
const QUERY_KEYS_HTTP_PATTERN: &[&str] = &["http-pattern", "httpPattern", "httppattern"];
const QUERY_KEY_INTERFACE: &str = "interface";
const QUERY_KEYS_SERVICE_ID: &[&str] = &["serviceId", "service-id", "serviceid"];

#[derive(Clone)]
pub(crate) struct DebugState {
    pub table: Arc<EndpointTable>,
    pub services: Arc<DashMap<String, BackendService>>,
}

pub(crate) fn debug_router(state: DebugState) -> Router {
    Router::new()
        .route("/debug/endpoints", get(query_endpoints))
        .route("/debug/services", get(query_services))
        .with_state(state)
}

/// Case-insensitive match: equality, or `expected` containing `input`.
/// The containment direction is asymmetric on purpose; operator tooling
/// relies on short inputs matching long identifiers.
fn query_match(input: &str, expected: &str) -> bool {
    let input = input.to_lowercase();
    let expected = expected.to_lowercase();
    input == expected || expected.contains(&input)
}

type EndpointFilter = Box<dyn Fn(&MultiVersionEndpoint) -> bool>;

fn endpoint_filters(params: &HashMap<String, String>) -> Vec<EndpointFilter> {
    let mut filters: Vec<EndpointFilter> = Vec::new();
    let field =
        |selector: fn(&Endpoint) -> String, query: String| -> EndpointFilter {
            Box::new(move |mv| {
                mv.any()
                    .is_some_and(|ep| query_match(&query, &selector(&ep)))
            })
        };

    if let Some(query) = non_empty(params, QUERY_KEY_APPLICATION) {
        filters.push(field(|ep| ep.application.clone(), query));
    }
    if let Some(query) = non_empty(params, QUERY_KEY_PROTOCOL) {
        filters.push(field(|ep| ep.protocol.to_string(), query));
    }
    for key in QUERY_KEYS_HTTP_PATTERN {
        if let Some(query) = non_empty(params, key) {
            filters.push(field(|ep| ep.http_pattern.clone(), query));
            break;
        }
    }
    if let Some(query) = non_empty(params, QUERY_KEY_INTERFACE) {
        filters.push(field(|ep| ep.upstream_uri.clone(), query));
    }
    filters
}

fn non_empty(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params.get(key).filter(|v| !v.is_empty()).cloned()
}

async fn query_endpoints(
    State(state): State<DebugState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let filters = endpoint_filters(&params);
    let snapshot = state.table.snapshot();

    if filters.is_empty() {
        let all: HashMap<String, HashMap<String, Endpoint>> = snapshot
            .into_iter()
            .map(|(key, mv)| (key, mv.to_map()))
            .collect();
        return json_response(&all);
    }

    // Any matching filter selects the endpoint set.
    let matched: Vec<HashMap<String, Endpoint>> = snapshot
        .into_iter()
        .filter(|(_, mv)| filters.iter().any(|filter| filter(mv)))
        .map(|(_, mv)| mv.to_map())
        .collect();
    json_response(&matched)
}

async fn query_services(
    State(state): State<DebugState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    for key in QUERY_KEYS_SERVICE_ID {
        let Some(id) = non_empty(&params, key) else {
            continue;
        };
        return match state.services.get(&id) {
            Some(service) => json_response(service.value()),
            None => json_response(&HashMap::from([
                ("status", "failed".to_string()),
                ("message", "service not found".to_string()),
                ("service-id", id),
            ])),
        };
    }
    json_response(&HashMap::from([
        ("status", "failed"),
        ("message", "param is required: serviceId"),
    ]))
}

fn json_response<T: Serialize>(data: &T) -> Response {
    match serde_json::to_vec(data) {
        Ok(body) => {
            let mut response = Response::new(axum::body::Body::from(body));
            response.headers_mut().insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static(CONTENT_TYPE_JSON),
            );
            response
        }
        Err(err) => {
            let mut response = Response::new(axum::body::Body::from(err.to_string()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}
