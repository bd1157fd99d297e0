//! HTTP layer: request-view construction and outcome serialization.

use crate::context::{parse_query_string, RequestContext};
use crate::engine::{FlowEngine, Outcome};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Response body when no flow claims the request.
pub const NOT_CLAIMED: &str = "no flow is responsible for this path";

/// Build the application router: a single catch-all GET route.
pub fn router(engine: Arc<FlowEngine>) -> Router {
    Router::new()
        .fallback(get(handle_request))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn handle_request(
    State(engine): State<Arc<FlowEngine>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let ctx = request_context(&request, peer.ip().to_string());

    match engine.handle(&ctx).await {
        Outcome::Claimed { flow, .. } => Json(flow).into_response(),
        Outcome::NotClaimed => (StatusCode::NOT_FOUND, NOT_CLAIMED).into_response(),
    }
}

/// Build the engine's request view from an HTTP request.
fn request_context(request: &Request, client_ip: String) -> RequestContext {
    let query_string = request.uri().query().map(str::to_string);
    let query_params = parse_query_string(query_string.as_deref());

    let mut headers: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            headers
                .entry(name.as_str().to_lowercase())
                .or_default()
                .push(value.to_string());
        }
    }

    let hostname = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(strip_port)
        .unwrap_or_default()
        .to_string();

    RequestContext {
        method: request.method().as_str().to_string(),
        hostname,
        path: request.uri().path().to_string(),
        query_string,
        query_params,
        headers,
        client_ip,
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
