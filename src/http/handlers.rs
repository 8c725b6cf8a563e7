//! Handlers for the gateway's own endpoints and the proxy fallback.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::http::request::request_id;
use crate::http::response::{self, HealthCheck, JsonBytes};
use crate::http::server::AppState;
use crate::resilience::BreakerSnapshot;
use crate::routing::endpoint::{HEALTH_TARGET, ROUTES_TARGET};

/// `GET /health`, guarded by the `health` breaker.
pub async fn health(State(state): State<AppState>) -> Response {
    let outcome = state.executor.call(HEALTH_TARGET, || {
        serde_json::to_vec(&HealthCheck::ok()).map(JsonBytes)
    });
    response::encode(HEALTH_TARGET, outcome, StatusCode::INTERNAL_SERVER_ERROR)
}

/// `GET /route`, guarded by the `routes` breaker.
pub async fn routes(State(state): State<AppState>) -> Response {
    let endpoints = state.endpoints.clone();
    let outcome = state.executor.call(ROUTES_TARGET, || {
        serde_json::to_vec(endpoints.as_ref()).map(JsonBytes)
    });
    response::encode(ROUTES_TARGET, outcome, StatusCode::INTERNAL_SERVER_ERROR)
}

/// `GET /breakers`. Read-only, never guarded.
pub async fn breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.executor.snapshots())
}

/// `GET /metrics` in the Prometheus text format.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => response::error_response(StatusCode::NOT_FOUND, "Metrics disabled"),
    }
}

/// Everything else: look up the route table and forward.
pub async fn proxy(State(state): State<AppState>, request: Request<Body>) -> Response {
    match state.routes.match_request(&request) {
        Some(route) => route.handler.forward(&state.executor, request).await,
        None => {
            tracing::warn!(
                request_id = request_id(&request).unwrap_or("unknown"),
                path = %request.uri().path(),
                "No route matched"
            );
            response::error_response(StatusCode::NOT_FOUND, "No matching route found")
        }
    }
}
