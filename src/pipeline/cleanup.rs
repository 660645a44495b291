//! Removal of the staged artifact once a run reaches a terminal state.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What happened to the staged artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStatus {
    /// The file was deleted.
    Removed,
    /// The file no longer existed.
    AlreadyGone,
    /// Deletion failed. The run's response is unaffected.
    Failed(String),
}

/// An artifact sitting at its staged path.
///
/// [`StagedArtifact::cleanup`] consumes the value, so a staged file is
/// deleted at most once.
#[derive(Debug)]
pub struct StagedArtifact {
    path: PathBuf,
}

impl StagedArtifact {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Staged location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the staged file.
    pub async fn cleanup(self) -> CleanupStatus {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Uploaded file deleted successfully");
                CleanupStatus::Removed
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Staged file {} was already gone", self.path.display());
                CleanupStatus::AlreadyGone
            }
            Err(e) => {
                warn!("Error deleting file {}: {}", self.path.display(), e);
                CleanupStatus::Failed(e.to_string())
            }
        }
    }
}
