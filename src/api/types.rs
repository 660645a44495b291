//! Request and response bodies.

use crate::pipeline::{ErrorKind, PipelineReport, VerificationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Multipart field carrying the `.eml` file.
pub const UPLOAD_FIELD: &str = "email_file";

/// Single response to a successful upload: the verdict message alongside
/// the structured result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Human-readable verdict.
    pub message: String,
    /// Extracted fields.
    #[serde(flatten)]
    pub result: VerificationResult,
}

impl From<PipelineReport> for VerifyResponse {
    fn from(report: PipelineReport) -> Self {
        Self {
            message: report.verdict.message().to_string(),
            result: report.result,
        }
    }
}

/// Error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What went wrong, including captured diagnostics for stage failures.
    pub message: String,
    /// Machine-readable kind.
    pub kind: ErrorKind,
}

/// Health check body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `ok` while the service is serving.
    pub status: String,
    /// Results stored since startup.
    pub runs: u64,
    /// When the stored result was last replaced.
    pub last_updated: Option<DateTime<Utc>>,
}
