//! HTTP surface.
//!
//! * `POST /verify-dkim` - multipart upload (field `email_file`), runs the
//!   pipeline and answers with one JSON payload.
//! * `GET /get-verification-result` - latest stored result, or 404.
//! * `GET /health` - liveness plus store statistics.

mod error;
mod routes;
pub mod types;

pub use error::{ApiError, ApiResult};

use crate::pipeline::Pipeline;
use crate::store::VerificationStore;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    store: VerificationStore,
}

impl AppState {
    /// Build state around a pipeline; the store is the pipeline's own.
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let store = pipeline.store().clone();
        Self { pipeline, store }
    }
}

/// Build the application router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/verify-dkim", post(routes::handle_verify_dkim))
        .route(
            "/get-verification-result",
            get(routes::handle_get_verification_result),
        )
        .route("/health", get(routes::handle_health))
        .fallback(routes::handler_404)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
