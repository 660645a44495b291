//! Route handlers.

use super::error::{ApiError, ApiResult};
use super::types::{HealthResponse, VerifyResponse, UPLOAD_FIELD};
use super::AppState;
use crate::pipeline::{PipelineError, UploadedArtifact, VerificationResult};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::extract::{Multipart, State};
use axum::Json;
use std::path::Path;
use tracing::{info, instrument};

/// Accept an `.eml` upload and run it through the pipeline.
///
/// The response is held open until the run reaches a terminal state. The run
/// itself continues on its own task if the client goes away, so the staged
/// artifact is still cleaned up.
#[instrument(skip_all)]
pub(super) async fn handle_verify_dkim(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<VerifyResponse>> {
    // Anything that is not a multipart body cannot carry the file.
    let Ok(mut multipart) = multipart else {
        return Err(PipelineError::MissingUpload.into());
    };

    let artifact = read_upload(state.pipeline.staging_dir(), &mut multipart).await?;
    info!(
        file = %artifact.original_name(),
        sha256 = %artifact.sha256(),
        "Received upload"
    );

    let report = state.pipeline.run_detached(artifact).await?;
    Ok(Json(report.into()))
}

async fn read_upload(
    upload_dir: &Path,
    multipart: &mut Multipart,
) -> ApiResult<UploadedArtifact> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(multipart_error)?;
        return Ok(UploadedArtifact::from_bytes(upload_dir, original_name, &bytes).await?);
    }

    Err(PipelineError::MissingUpload.into())
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::TooLarge(err.body_text())
    } else {
        ApiError::Multipart(err.body_text())
    }
}

/// Latest stored result.
pub(super) async fn handle_get_verification_result(
    State(state): State<AppState>,
) -> ApiResult<Json<VerificationResult>> {
    state.store.read().map(Json).ok_or(ApiError::NoResult)
}

/// Liveness and store statistics.
pub(super) async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        runs: state.store.runs(),
        last_updated: state.store.updated_at(),
    })
}

/// Fallback for unmatched routes.
pub(super) async fn handler_404() -> ApiError {
    ApiError::RouteNotFound
}
