//! Request-level errors and their HTTP rendering

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bucketgate_core::BackendError;
use thiserror::Error;
use tracing::warn;

/// Why an object request did not succeed
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed request parameters or body
    #[error("{0}")]
    BadRequest(String),

    #[error("Precondition Failed")]
    PreconditionFailed,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Backend(e) => e.http_status(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "Backend request failed");
        }

        if matches!(self, Self::PreconditionFailed) {
            return status.into_response();
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
