//! Storefront error type and its HTTP rendering.
//!
//! Services return [`ServiceError`]; `IntoResponse` is the one place an error
//! becomes a status code and a client-safe JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::store::StoreError;

const INTERNAL_MESSAGE: &str = "Internal server error. Please try again later.";

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Conflict",
    "message": "Conflict: Insufficient stock for Nebula Orb. Available: 1",
    "code": 409,
    "request_id": "req-3f0c9b5e2a7d4e1b8c6a0d9e7f5b3a21",
    "timestamp": "2024-12-09T10:30:00+00:00"
}))]
pub struct ErrorResponse {
    /// Status reason phrase, e.g. "Not Found"
    pub error: String,
    pub message: String,
    /// Numeric error kind, equal to the HTTP status code
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Field-level validation failure
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Malformed or missing request data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Stock, active-state or uniqueness violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The gateway signature did not check out
    #[error("Payment rejected: {0}")]
    PaymentRejected(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Hash error: {0}")]
    HashError(String),

    #[error("Circuit breaker open")]
    CircuitBreakerOpen,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::StoreError(StoreError::Missing(_)) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::JwtError(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) | Self::StoreError(StoreError::Rejected(_)) => StatusCode::CONFLICT,
            Self::PaymentRejected(_) => StatusCode::PAYMENT_REQUIRED,
            Self::CircuitBreakerOpen | Self::ServiceUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::StoreError(_) | Self::InternalError(_) | Self::HashError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message rendered to the client. Anything that maps to 500 is reduced
    /// to a generic line; the cause only goes to the log.
    pub fn response_message(&self) -> String {
        match self {
            Self::StoreError(StoreError::Rejected(msg)) => format!("Conflict: {}", msg),
            Self::StoreError(StoreError::Missing(what)) => format!("Not found: {} not found", what),
            Self::JwtError(_) => "Unauthorized: invalid or expired token".to_string(),
            Self::CircuitBreakerOpen => {
                "Payment gateway temporarily unavailable. Please retry shortly.".to_string()
            }
            err if err.status_code().is_server_error() && !matches!(err, Self::ServiceUnavailable(_)) => {
                INTERNAL_MESSAGE.to_string()
            }
            _ => self.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == StatusCode::NOT_FOUND
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: status.as_u16(),
            request_id: crate::tracing::current_request_id().map(|id| id.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracing::{scope_request_id, RequestId};
    use axum::body::to_bytes;
    use rstest::rstest;

    #[rstest]
    #[case(ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND)]
    #[case(ServiceError::StoreError(StoreError::Missing("Cart item 4".into())), StatusCode::NOT_FOUND)]
    #[case(ServiceError::InvalidInput("x".into()), StatusCode::BAD_REQUEST)]
    #[case(ServiceError::ValidationError("x".into()), StatusCode::BAD_REQUEST)]
    #[case(ServiceError::JwtError("expired".into()), StatusCode::UNAUTHORIZED)]
    #[case(ServiceError::Forbidden("x".into()), StatusCode::FORBIDDEN)]
    #[case(ServiceError::Conflict("x".into()), StatusCode::CONFLICT)]
    #[case(ServiceError::StoreError(StoreError::Rejected("x".into())), StatusCode::CONFLICT)]
    #[case(ServiceError::PaymentRejected("x".into()), StatusCode::PAYMENT_REQUIRED)]
    #[case(ServiceError::CircuitBreakerOpen, StatusCode::SERVICE_UNAVAILABLE)]
    #[case(ServiceError::HashError("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn maps_to_status(#[case] err: ServiceError, #[case] expected: StatusCode) {
        assert_eq!(err.status_code(), expected);
    }

    #[test]
    fn server_errors_never_leak_their_cause() {
        for err in [
            ServiceError::HashError("salt mismatch".into()),
            ServiceError::InternalError("lock poisoned".into()),
            ServiceError::Other(anyhow::anyhow!("stack trace here")),
        ] {
            assert_eq!(err.response_message(), INTERNAL_MESSAGE);
        }
        assert_eq!(
            ServiceError::Conflict("Product Nebula Orb is no longer available".into())
                .response_message(),
            "Conflict: Product Nebula Orb is no longer available"
        );
    }

    #[tokio::test]
    async fn body_carries_code_and_request_id() {
        let response = scope_request_id(RequestId::new("req-123"), async {
            ServiceError::PaymentRejected("Payment verification failed".into()).into_response()
        })
        .await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.code, 402);
        assert_eq!(payload.error, "Payment Required");
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(
            payload.message,
            "Payment rejected: Payment verification failed"
        );
    }
}
