//! Error types for the HTTP layer.
//!
//! [`ApiError`] wraps the queue taxonomy plus request-level failures and
//! converts into a JSON response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use callsys_core::QueueError;

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A queue operation failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The request body or query failed validation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// An id in the request path could not be parsed.
    #[error("invalid id: {0}")]
    InvalidId(String),
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl ApiError {
    /// HTTP status the error maps to.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidId(_) => StatusCode::BAD_REQUEST,
            Self::Queue(e) => match e {
                QueueError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                QueueError::Unauthorized => StatusCode::UNAUTHORIZED,
                QueueError::Forbidden(_) => StatusCode::FORBIDDEN,
                QueueError::NotFound(_) => StatusCode::NOT_FOUND,
                QueueError::Exhausted { .. }
                | QueueError::BelowCurrent { .. }
                | QueueError::AlreadyPassed { .. }
                | QueueError::ManualInputOnly
                | QueueError::OutsideBusinessHours => StatusCode::CONFLICT,
                QueueError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                QueueError::Closed | QueueError::StoreUnavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                QueueError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use callsys_types::Permission;

    use super::*;

    #[test]
    fn queue_errors_map_to_statuses() {
        let cases = [
            (QueueError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                QueueError::Forbidden(Permission::Settings),
                StatusCode::FORBIDDEN,
            ),
            (
                QueueError::Exhausted {
                    current: 3,
                    issued: 3,
                },
                StatusCode::CONFLICT,
            ),
            (QueueError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (
                QueueError::StoreUnavailable("down".to_owned()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
