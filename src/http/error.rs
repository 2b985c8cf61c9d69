//! API error type mapped to HTTP status codes.
//!
//! Produces a JSON body `{"error": "message"}`. Storage details are logged,
//! never sent to the client.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::error::Error;

#[derive(Debug)]
pub enum ApiError {
    /// Invalid path, query or body (400).
    BadRequest(String),
    /// Backing store unreachable (503). Only used by the health check.
    ServiceUnavailable(String),
    /// Unexpected server error (500).
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Validation(msg) => ApiError::BadRequest(msg),
            Error::Storage(e) => {
                error!("database error: {e}");
                ApiError::Internal(
                    "a database error occurred, check server logs for details".to_string(),
                )
            }
            other => {
                error!("unexpected error: {other}");
                ApiError::Internal(
                    "an unexpected error occurred, check server logs for details".to_string(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let resp = ApiError::from(Error::Validation("queue name must not be empty".into()))
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn storage_maps_to_internal() {
        let resp = ApiError::from(Error::Storage(sqlx::Error::PoolTimedOut)).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
