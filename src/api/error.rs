//! Error responses for the HTTP surface.

use crate::api::types::ErrorResponse;
use crate::pipeline::{ErrorKind, PipelineError, StageFailure};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

/// Result type for route handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by route handlers.
///
/// Every variant renders as a JSON body `{"message": ..., "kind": ...}`.
/// Status codes:
/// * missing or invalid upload, malformed multipart - 400
/// * upload over the body limit - 413
/// * no stored result, unknown route - 404
/// * another run in flight - 409
/// * stage timeout - 504
/// * any other stage or extraction failure - 500
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Pipeline failure, including upload validation.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The multipart body could not be read.
    #[error("Invalid multipart body: {0}")]
    Multipart(String),

    /// The upload exceeds the configured body limit.
    #[error("Upload too large: {0}")]
    TooLarge(String),

    /// No verification has completed yet.
    #[error("No result found")]
    NoResult,

    /// No route matched.
    #[error("The requested resource was not found")]
    RouteNotFound,
}

impl ApiError {
    /// Machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Pipeline(e) => e.kind(),
            Self::Multipart(_) => ErrorKind::InvalidUpload,
            Self::TooLarge(_) => ErrorKind::PayloadTooLarge,
            Self::NoResult | Self::RouteNotFound => ErrorKind::NotFound,
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Pipeline(
                PipelineError::MissingUpload
                | PipelineError::InvalidUpload(_)
                | PipelineError::NameInUse(_),
            )
            | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Pipeline(PipelineError::Busy) => StatusCode::CONFLICT,
            Self::Pipeline(PipelineError::Stage {
                failure: StageFailure::TimedOut(_),
                ..
            }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoResult | Self::RouteNotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = ?self.kind(), "{}", self);
        } else if !matches!(self, Self::NoResult | Self::RouteNotFound) {
            warn!(kind = ?self.kind(), "{}", self);
        }

        let body = ErrorResponse {
            message: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}
