//! Mapping of engine errors onto HTTP responses

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sensory_common::Error;
use serde_json::json;
use tracing::error;

/// Engine error wrapped for handlers
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

/// Unreadable request bodies get the same JSON error shape as engine errors
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::invalid("body", rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidInput { .. } | Error::IncompleteSubmission(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) | Error::NoAssignment { .. } => StatusCode::NOT_FOUND,
            Error::AlreadyRandomized(_)
            | Error::DuplicateEvaluation { .. }
            | Error::SubmissionInFlight { .. } => StatusCode::CONFLICT,
            Error::PersistenceFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Database(_) if self.0.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), "Request failed: {}", self.0);
        }

        let body = Json(json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
            "retryable": self.0.is_retryable(),
        }));

        (status, body).into_response()
    }
}
