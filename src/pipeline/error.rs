//! Pipeline error taxonomy.

use crate::pipeline::extract::ExtractionError;
use crate::pipeline::runner::{OutcomeStatus, StageOutcome};
use crate::pipeline::Stage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why a stage failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageFailure {
    /// Filesystem operation failed.
    #[error("{0}")]
    Io(String),

    /// The external program exited unsuccessfully.
    #[error("{detail}: {stderr}")]
    Exited {
        /// Exit detail, e.g. `exit status: 1`.
        detail: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The external program could not be started.
    #[error("failed to start: {0}")]
    Spawn(String),

    /// The external program exceeded its timeout and was killed.
    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

impl From<StageOutcome> for StageFailure {
    fn from(outcome: StageOutcome) -> Self {
        match outcome.status {
            OutcomeStatus::SpawnFailed => Self::Spawn(outcome.stderr.trim().to_string()),
            OutcomeStatus::TimedOut(after) => Self::TimedOut(after),
            OutcomeStatus::Exited(_) => Self::Exited {
                detail: outcome.detail,
                stderr: outcome.stderr.trim().to_string(),
            },
        }
    }
}

/// Error from a verification run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request carried no artifact.
    #[error("No file uploaded. Please upload a .eml file.")]
    MissingUpload,

    /// The artifact's name cannot be used as a staged file name.
    #[error("Invalid upload file name: {0:?}")]
    InvalidUpload(String),

    /// A file with the artifact's name already sits in the staging directory.
    #[error("A file named {0:?} already exists in the staging directory")]
    NameInUse(String),

    /// Another run is in flight and queueing is disabled.
    #[error("A verification is already in progress")]
    Busy,

    /// A stage failed; later stages did not run.
    #[error("{}: {failure}", stage.failure_message())]
    Stage {
        /// Failed stage.
        stage: Stage,
        /// Captured diagnostic.
        failure: StageFailure,
    },

    /// The prover succeeded but its output lacks an expected field.
    #[error("Error extracting verification result: {0}")]
    Extraction(#[from] ExtractionError),

    /// The run's task died before producing a result.
    #[error("Verification task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// Machine-readable error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingUpload => ErrorKind::MissingUpload,
            Self::InvalidUpload(_) | Self::NameInUse(_) => ErrorKind::InvalidUpload,
            Self::Busy => ErrorKind::Busy,
            Self::Stage {
                failure: StageFailure::TimedOut(_),
                ..
            } => ErrorKind::StageTimeout,
            Self::Stage { stage, .. } => match stage {
                Stage::Intake => ErrorKind::IntakeFailed,
                Stage::Normalize => ErrorKind::NormalizeFailed,
                Stage::Build => ErrorKind::BuildFailed,
                Stage::Prove => ErrorKind::ProveFailed,
            },
            Self::Extraction(_) => ErrorKind::ExtractionFailed,
            Self::Aborted(_) => ErrorKind::Internal,
        }
    }

    /// Stage that failed, if any.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub(crate) fn stage_io(stage: Stage, err: &std::io::Error) -> Self {
        Self::Stage {
            stage,
            failure: StageFailure::Io(err.to_string()),
        }
    }
}

/// Error kinds exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No artifact in the request.
    MissingUpload,
    /// Artifact name or body unusable.
    InvalidUpload,
    /// Request body exceeds the upload limit.
    PayloadTooLarge,
    /// Staging failed.
    IntakeFailed,
    /// Line-ending normalization failed.
    NormalizeFailed,
    /// Toolchain build failed.
    BuildFailed,
    /// Prover failed.
    ProveFailed,
    /// A stage exceeded its timeout.
    StageTimeout,
    /// Prover output lacked an expected field.
    ExtractionFailed,
    /// Another run is in flight.
    Busy,
    /// No such resource.
    NotFound,
    /// Unexpected internal failure.
    Internal,
}
