//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use saga::SagaError;
use storage::StorageError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No caller identity on a route that needs one.
    Unauthorized(String),
    /// Saga error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let status = match &err {
        SagaError::ProductUnavailable(_)
        | SagaError::CartNotFound(_)
        | SagaError::ItemNotFound(_)
        | SagaError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        SagaError::Domain(DomainError::InvalidStatusTransition { .. }) => StatusCode::CONFLICT,
        SagaError::Domain(_) => StatusCode::BAD_REQUEST,
        SagaError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        SagaError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
        SagaError::EmptyCart => StatusCode::UNPROCESSABLE_ENTITY,
        SagaError::Persistence(StorageError::Conflict(_)) => StatusCode::CONFLICT,
        SagaError::Persistence(StorageError::NotFound { .. }) => StatusCode::NOT_FOUND,
        SagaError::Persistence(StorageError::Rejected(_)) => StatusCode::BAD_REQUEST,
        SagaError::Persistence(_) | SagaError::PostCommitSideEffect { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
