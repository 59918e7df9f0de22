//! HTTP error responses.
//!
//! Every error body has the shape `{"error": {"code": ..., "message": ...}}`
//! where `code` is the stable [`HiveError::code`] string.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hive_common::HiveError;
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// API error response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }
}

/// HTTP status for a domain error.
pub fn status_for(err: &HiveError) -> StatusCode {
    match err {
        HiveError::AgentNotFound(_) | HiveError::TaskNotFound(_) | HiveError::UnknownTool(_) => {
            StatusCode::NOT_FOUND
        }
        HiveError::NoActiveTask(_) => StatusCode::CONFLICT,
        HiveError::Forbidden { .. } => StatusCode::FORBIDDEN,
        HiveError::Validation(_) => StatusCode::BAD_REQUEST,
        HiveError::Tool(_) => StatusCode::UNPROCESSABLE_ENTITY,
        HiveError::Upstream(_) => StatusCode::BAD_GATEWAY,
        HiveError::InvalidTransition { .. }
        | HiveError::Config(_)
        | HiveError::Io(_)
        | HiveError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<HiveError> for ApiError {
    fn from(err: HiveError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(error = %err, "Request failed");
        }
        Self::new(status, err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorEnvelope { error: self.body })).into_response()
    }
}
