//! Verification pipeline.
//!
//! Each upload runs the same strictly sequential chain. A stage only runs
//! when the previous one succeeded, and the first failure ends the run with
//! a single error naming that stage.
//!
//! # Architecture
//!
//! ```text
//! upload received
//!        │
//!        ▼
//! ┌──────────────┐  link temp upload to <staging_dir>/<original name>,
//! │ Intake       │  refusing names that already exist
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  dos2unix (or built-in CRLF → LF)
//! │ Normalize    │
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  cargo prove build  (build_dir)
//! │ Build        │
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  cargo run --release -- --prove  (project_dir)
//! │ Prove        │
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  scan stdout for payment fields
//! │ Extract      │──► replace stored result
//! └──────┬───────┘
//!        ▼
//!   delete staged artifact (whenever Intake succeeded)
//! ```

mod chain;
mod cleanup;
mod error;
pub mod extract;
mod runner;

use std::fmt;

pub use chain::{Pipeline, PipelineReport, UploadedArtifact};
pub use cleanup::{CleanupStatus, StagedArtifact};
pub use error::{ErrorKind, PipelineError, StageFailure};
pub use extract::{Evaluation, ExtractionError, Field, VerificationResult, Verdict};
pub use runner::{CommandRunner, CommandSpec, OutcomeStatus, StageOutcome, TokioRunner};

/// A step of the verification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Move the upload to its staged path.
    Intake,
    /// Canonicalize line endings in place.
    Normalize,
    /// Build the prover toolchain.
    Build,
    /// Generate and check the proof.
    Prove,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Self; 4] = [Self::Intake, Self::Normalize, Self::Build, Self::Prove];

    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Normalize => "normalize",
            Self::Build => "build",
            Self::Prove => "prove",
        }
    }

    /// Prefix of the message reported when this stage fails.
    #[must_use]
    pub const fn failure_message(self) -> &'static str {
        match self {
            Self::Intake => "Error renaming file",
            Self::Normalize => "Error converting file line endings",
            Self::Build => "Error building Rust project",
            Self::Prove => "Error during DKIM verification",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
