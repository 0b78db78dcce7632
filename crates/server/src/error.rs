//! HTTP error responses.
//!
//! Every error body is `{"error": "<message>"}`. Client input problems are
//! 400 with the validation message; everything else is a generic 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docstream_core::AppError;
use docstream_retrieval::QUERY_REQUIRED;
use docstream_stream::ErrorBody;

/// Message returned for any server-side failure.
pub const INTERNAL_ERROR: &str = "Internal server error";

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// 400 Bad Request with the given message.
pub fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

/// 400 for a missing, empty or unreadable query.
pub fn query_required() -> ApiError {
    bad_request(QUERY_REQUIRED)
}

/// 500 with the fixed internal error message.
pub fn internal() -> ApiError {
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: INTERNAL_ERROR.to_string(),
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Input(message) => bad_request(message),
            other => {
                tracing::error!("Request failed: {}", other);
                internal()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_maps_to_bad_request() {
        let err = ApiError::from(AppError::Input(QUERY_REQUIRED.to_string()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Query is required");
    }

    #[test]
    fn test_other_errors_hide_details() {
        let err = ApiError::from(AppError::Corpus("disk on fire".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), INTERNAL_ERROR);
    }
}
