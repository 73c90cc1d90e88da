use axum::{http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::ServiceError;

/// Structured error payload returned by every failed endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 500 with a context line and the underlying error message.
pub fn internal_error(
    context: &str,
    err: impl std::fmt::Display,
) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!(error = %err, "{}", context);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: context.to_string(),
            message: Some(err.to_string()),
        }),
    )
}

/// Map an aggregation failure to its HTTP shape: bad bounds are the caller's
/// fault, everything else is an upstream failure.
pub fn service_error(context: &str, err: ServiceError) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        ServiceError::InvalidQuery(message) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Invalid query".to_string(),
                message: Some(message),
            }),
        ),
        err @ ServiceError::Upstream(_) => internal_error(context, err),
    }
}
