//! Error types for the operator API.
//!
//! [`ApiError`] unifies all failure modes into a single enum that can be
//! converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. Bodies
//! are `{ "error": <message>, "status": <code> }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkin_core::{ReconcileError, StoreError};

/// Errors that can occur in the operator API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The requested event does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A UUID could not be parsed from the request path.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    /// The request body was well-formed but not acceptable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The event store could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::NotFound(id) => Self::NotFound(format!("Event {id} not found")),
            ReconcileError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            ReconcileError::Store(StoreError::Unavailable(msg)) => Self::Unavailable(msg),
            ReconcileError::Store(other) => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::InvalidUuid(msg) | Self::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use checkin_types::EventId;

    use super::*;

    #[test]
    fn reconcile_errors_map_to_status_codes() {
        let cases = [
            (
                ReconcileError::NotFound(EventId::new()),
                StatusCode::NOT_FOUND,
            ),
            (
                ReconcileError::InvalidArgument(String::from("bad")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ReconcileError::Store(StoreError::Unavailable(String::from("down"))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ReconcileError::Store(StoreError::Backend(String::from("boom"))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }
}
