//! Response encoding.
//!
//! # Responsibilities
//! - Map a guarded call's outcome to an HTTP response
//! - Keep backend error detail out of client-facing bodies
//! - Shared JSON payload types for the gateway's own endpoints
//!
//! # Design Decisions
//! - Success passes the payload through untouched (200 for local payloads,
//!   the backend's own status for proxied responses)
//! - Failure becomes a stable 5xx chosen by the caller (500 local, 502 upstream)
//! - Rejection is always 503 "Service unavailable" and logged at debug only

use std::fmt;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::resilience::{BreakerOpen, CallOutcome};

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "api-gateway";

/// Body of a rejected call.
pub const SERVICE_UNAVAILABLE: &str = "Service unavailable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub service: String,
}

impl HealthCheck {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            service: SERVICE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Pre-serialized JSON served with a JSON content type.
#[derive(Debug, Clone)]
pub struct JsonBytes(pub Vec<u8>);

impl IntoResponse for JsonBytes {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "application/json")], self.0).into_response()
    }
}

/// JSON error response with the given status.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Response for a call the breaker refused to run.
pub fn rejected(open: &BreakerOpen) -> Response {
    tracing::debug!(breaker = %open.target, state = %open.state, "Request rejected, breaker not closed");
    error_response(StatusCode::SERVICE_UNAVAILABLE, SERVICE_UNAVAILABLE)
}

/// Encode a guarded call's outcome.
///
/// `failure_status` is what a failed call turns into; the error itself only
/// reaches the log.
pub fn encode<T, E>(target: &str, outcome: CallOutcome<T, E>, failure_status: StatusCode) -> Response
where
    T: IntoResponse,
    E: fmt::Display,
{
    match outcome {
        CallOutcome::Success(payload) => {
            let response = payload.into_response();
            tracing::info!(breaker = %target, status = %response.status(), "Request served");
            response
        }
        CallOutcome::Failure(err) => {
            tracing::error!(breaker = %target, error = %err, status = %failure_status, "Request failed");
            error_response(
                failure_status,
                failure_status.canonical_reason().unwrap_or("Request failed"),
            )
        }
        CallOutcome::Rejected(open) => rejected(&open),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::resilience::{BreakerState, CallFailure};

    async fn body_of(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_success_passes_payload_through() {
        let payload = JsonBytes(serde_json::to_vec(&HealthCheck::ok()).unwrap());
        let outcome: CallOutcome<_, String> = CallOutcome::Success(payload);

        let response = encode("health", outcome, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_of(response).await, r#"{"status":"OK","service":"api-gateway"}"#);
    }

    #[tokio::test]
    async fn test_failure_hides_error_detail() {
        let outcome: CallOutcome<JsonBytes, String> =
            CallOutcome::Failure(CallFailure::Error("connection refused by 10.0.0.7".to_string()));

        let response = encode("service", outcome, StatusCode::BAD_GATEWAY);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_of(response).await;
        assert_eq!(body, r#"{"error":"Bad Gateway"}"#);
        assert!(!body.contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_rejection_is_service_unavailable() {
        let outcome: CallOutcome<JsonBytes, String> = CallOutcome::Rejected(BreakerOpen {
            target: "service".to_string(),
            state: BreakerState::Open,
        });

        let response = encode("service", outcome, StatusCode::BAD_GATEWAY);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_of(response).await, r#"{"error":"Service unavailable"}"#);
    }
}
