//! Stage chain driving one verification run.

use crate::config::{PipelineConfig, ProverConfig, ServiceConfig};
use crate::event::{PipelineEvent, PipelineEventsSender};
use crate::pipeline::cleanup::{CleanupStatus, StagedArtifact};
use crate::pipeline::error::{PipelineError, StageFailure};
use crate::pipeline::extract::{self, Evaluation, VerificationResult, Verdict};
use crate::pipeline::runner::{CommandRunner, CommandSpec, StageOutcome};
use crate::pipeline::Stage;
use crate::store::VerificationStore;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

const PROVER_MODE_ENV: &str = "SP1_PROVER";
const PROVER_KEY_ENV: &str = "SP1_PRIVATE_KEY";
const PROVER_LOG_ENV: &str = "RUST_LOG";

/// A freshly uploaded artifact, still at its temporary path.
///
/// The temporary file is removed on drop unless Intake moved it.
#[derive(Debug)]
pub struct UploadedArtifact {
    original_name: String,
    temp_path: TempPath,
    sha256: String,
    size: usize,
}

impl UploadedArtifact {
    /// Write `bytes` to a new temporary file inside `upload_dir`.
    ///
    /// # Errors
    ///
    /// Returns an Intake failure if the temporary file cannot be written.
    pub async fn from_bytes(
        upload_dir: &Path,
        original_name: impl Into<String>,
        bytes: &[u8],
    ) -> Result<Self, PipelineError> {
        let temp_path = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(upload_dir)
            .map_err(|e| PipelineError::stage_io(Stage::Intake, &e))?
            .into_temp_path();
        tokio::fs::write(&temp_path, bytes)
            .await
            .map_err(|e| PipelineError::stage_io(Stage::Intake, &e))?;

        Ok(Self {
            original_name: original_name.into(),
            temp_path,
            sha256: hex::encode(Sha256::digest(bytes)),
            size: bytes.len(),
        })
    }

    /// Client-supplied file name.
    #[must_use]
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Hex SHA-256 of the uploaded bytes.
    #[must_use]
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Where Intake will place the artifact inside `staging_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidUpload`] if the original name is not a
    /// plain file name.
    pub fn staged_path(&self, staging_dir: &Path) -> Result<PathBuf, PipelineError> {
        sanitize_file_name(&self.original_name)
            .map(|name| staging_dir.join(name))
            .ok_or_else(|| PipelineError::InvalidUpload(self.original_name.clone()))
    }
}

fn sanitize_file_name(name: &str) -> Option<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return None;
    }
    Some(name)
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Identifier used in logs and events.
    pub run_id: String,
    /// Marker-based verdict.
    pub verdict: Verdict,
    /// Extracted fields, also written to the store.
    pub result: VerificationResult,
    /// What happened to the staged artifact.
    pub cleanup: CleanupStatus,
}

/// The verification pipeline.
///
/// Runs are serialized: only one artifact is staged at a time because the
/// staging, build and project directories are shared.
pub struct Pipeline {
    config: PipelineConfig,
    prover: ProverConfig,
    runner: Arc<dyn CommandRunner>,
    store: VerificationStore,
    events: PipelineEventsSender,
    in_flight: Mutex<()>,
}

impl Pipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        config: &ServiceConfig,
        runner: Arc<dyn CommandRunner>,
        store: VerificationStore,
        events: PipelineEventsSender,
    ) -> Self {
        Self {
            config: config.pipeline.clone(),
            prover: config.prover.clone(),
            runner,
            store,
            events,
            in_flight: Mutex::new(()),
        }
    }

    /// Directory uploads are staged into.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.config.staging_dir
    }

    /// Store updated by successful runs.
    #[must_use]
    pub fn store(&self) -> &VerificationStore {
        &self.store
    }

    /// Run the full chain for `artifact`.
    ///
    /// Waits for any in-flight run to finish first, or fails with
    /// [`PipelineError::Busy`] when `reject_when_busy` is set.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure, an extraction failure, or an upload
    /// validation error. The store is only updated on success.
    pub async fn run(&self, artifact: UploadedArtifact) -> Result<PipelineReport, PipelineError> {
        let _guard = if self.config.reject_when_busy {
            self.in_flight.try_lock().map_err(|_| PipelineError::Busy)?
        } else {
            self.in_flight.lock().await
        };

        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("verify", run_id = %run_id, file = %artifact.original_name);
        self.run_exclusive(run_id, artifact).instrument(span).await
    }

    /// Run on a separate task so the chain and its cleanup complete even if
    /// the caller's future is dropped.
    ///
    /// # Errors
    ///
    /// Same as [`Pipeline::run`], plus [`PipelineError::Aborted`] if the task
    /// panics.
    pub async fn run_detached(
        self: &Arc<Self>,
        artifact: UploadedArtifact,
    ) -> Result<PipelineReport, PipelineError> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run(artifact).await })
            .await
            .map_err(|e| PipelineError::Aborted(e.to_string()))?
    }

    async fn run_exclusive(
        &self,
        run_id: String,
        artifact: UploadedArtifact,
    ) -> Result<PipelineReport, PipelineError> {
        info!(
            size = artifact.size,
            sha256 = %artifact.sha256,
            "Starting verification run"
        );

        let staged = self.intake(&run_id, artifact).await?;
        let evaluation = self.process(&run_id, staged.path()).await;

        if let Ok(evaluation) = &evaluation {
            self.store.replace(evaluation.result.clone());
            self.emit(PipelineEvent::ResultStored {
                run_id: run_id.clone(),
                verified: evaluation.result.verified,
            });
        }

        let cleanup = staged.cleanup().await;
        if let CleanupStatus::Failed(message) = &cleanup {
            self.emit(PipelineEvent::CleanupFailed {
                run_id: run_id.clone(),
                message: message.clone(),
            });
        }

        let Evaluation { verdict, result } = evaluation?;
        info!(verified = result.verified, ?verdict, "Verification run complete");

        Ok(PipelineReport {
            run_id,
            verdict,
            result,
            cleanup,
        })
    }

    async fn intake(
        &self,
        run_id: &str,
        artifact: UploadedArtifact,
    ) -> Result<StagedArtifact, PipelineError> {
        let staged_path = artifact.staged_path(&self.config.staging_dir)?;
        self.stage_started(run_id, Stage::Intake);

        // Linking never replaces an existing file. The temp name is removed
        // when the artifact drops at the end of this function.
        match tokio::fs::hard_link(&artifact.temp_path, &staged_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!("Refusing to overwrite {}", staged_path.display());
                return Err(PipelineError::NameInUse(artifact.original_name.clone()));
            }
            Err(e) => {
                return Err(self.stage_failed(run_id, PipelineError::stage_io(Stage::Intake, &e)));
            }
        }

        debug!("Staged upload at {}", staged_path.display());
        self.stage_completed(run_id, Stage::Intake);
        Ok(StagedArtifact::new(staged_path))
    }

    async fn process(&self, run_id: &str, staged: &Path) -> Result<Evaluation, PipelineError> {
        self.normalize(run_id, staged).await?;

        let build = self.command(
            run_id,
            Stage::Build,
            &self.config.build_command,
            &self.config.build_dir,
        )?;
        self.run_stage(run_id, Stage::Build, &build, self.config.build_timeout())
            .await?;
        info!("Rust project built successfully");

        let prove = self.prove_command(run_id)?;
        let outcome = self
            .run_stage(run_id, Stage::Prove, &prove, self.config.prove_timeout())
            .await?;
        debug!(stdout = %outcome.stdout, "DKIM verification result");

        extract::evaluate(&outcome.stdout).map_err(|e| {
            error!("{}", e);
            PipelineError::from(e)
        })
    }

    async fn normalize(&self, run_id: &str, staged: &Path) -> Result<(), PipelineError> {
        if self.config.normalize_command.is_empty() {
            self.stage_started(run_id, Stage::Normalize);
            return match normalize_line_endings(staged).await {
                Ok(()) => {
                    self.stage_completed(run_id, Stage::Normalize);
                    Ok(())
                }
                Err(e) => Err(self.stage_failed(
                    run_id,
                    PipelineError::stage_io(Stage::Normalize, &e),
                )),
            };
        }

        let spec = self
            .command(
                run_id,
                Stage::Normalize,
                &self.config.normalize_command,
                Path::new("."),
            )?
            .arg(staged.to_string_lossy());
        self.run_stage(run_id, Stage::Normalize, &spec, self.config.normalize_timeout())
            .await
            .map(drop)
    }

    fn prove_command(&self, run_id: &str) -> Result<CommandSpec, PipelineError> {
        let mut spec = self
            .command(
                run_id,
                Stage::Prove,
                &self.config.prove_command,
                &self.config.project_dir,
            )?
            .env(PROVER_MODE_ENV, &self.prover.mode)
            .env(PROVER_LOG_ENV, &self.prover.log);
        if let Some(key) = &self.prover.private_key {
            spec = spec.secret_env(PROVER_KEY_ENV, key.clone());
        }
        Ok(spec)
    }

    fn command(
        &self,
        run_id: &str,
        stage: Stage,
        argv: &[String],
        cwd: &Path,
    ) -> Result<CommandSpec, PipelineError> {
        CommandSpec::from_argv(argv, cwd).ok_or_else(|| {
            self.stage_failed(
                run_id,
                PipelineError::Stage {
                    stage,
                    failure: StageFailure::Spawn("no command configured".to_string()),
                },
            )
        })
    }

    async fn run_stage(
        &self,
        run_id: &str,
        stage: Stage,
        spec: &CommandSpec,
        timeout: Duration,
    ) -> Result<StageOutcome, PipelineError> {
        self.stage_started(run_id, stage);
        let outcome = self.runner.run(spec, timeout).await;

        if outcome.success {
            self.stage_completed(run_id, stage);
            Ok(outcome)
        } else {
            let failure = StageFailure::from(outcome);
            Err(self.stage_failed(run_id, PipelineError::Stage { stage, failure }))
        }
    }

    fn stage_started(&self, run_id: &str, stage: Stage) {
        debug!(%stage, "Stage started");
        self.emit(PipelineEvent::StageStarted {
            run_id: run_id.to_string(),
            stage,
        });
    }

    fn stage_completed(&self, run_id: &str, stage: Stage) {
        debug!(%stage, "Stage completed");
        self.emit(PipelineEvent::StageCompleted {
            run_id: run_id.to_string(),
            stage,
        });
    }

    fn stage_failed(&self, run_id: &str, err: PipelineError) -> PipelineError {
        error!("{}", err);
        if let Some(stage) = err.stage() {
            self.emit(PipelineEvent::StageFailed {
                run_id: run_id.to_string(),
                stage,
                message: err.to_string(),
            });
        }
        err
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.send(event);
    }
}

/// Rewrite CRLF line endings to LF in place. Lone CRs are kept.
pub(crate) async fn normalize_line_endings(path: &Path) -> std::io::Result<()> {
    let contents = tokio::fs::read(path).await?;
    if !contents.windows(2).any(|pair| pair == b"\r\n") {
        return Ok(());
    }

    let mut normalized = Vec::with_capacity(contents.len());
    let mut bytes = contents.iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        if byte == b'\r' && bytes.peek() == Some(&b'\n') {
            continue;
        }
        normalized.push(byte);
    }
    tokio::fs::write(path, normalized).await
}
