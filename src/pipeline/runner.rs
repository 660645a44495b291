//! External process execution for pipeline stages.
//!
//! A stage never gets a Rust error back from the runner: non-zero exits,
//! spawn failures and timeouts all come back as a failed [`StageOutcome`].
//!
//! On unix every command leads its own process group. A timeout kills the
//! whole group, so helpers started by `cargo run` or `sh` die with it.

use crate::config::SecretString;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// One external command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Executable to run.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: PathBuf,
    /// Environment overrides layered over the inherited environment.
    pub envs: Vec<(String, String)>,
    /// Environment overrides whose values must never be logged.
    pub secret_envs: Vec<(String, SecretString)>,
}

impl CommandSpec {
    /// Build a spec from an argv vector. Returns `None` for an empty argv.
    #[must_use]
    pub fn from_argv(argv: &[String], cwd: impl Into<PathBuf>) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            cwd: cwd.into(),
            envs: Vec::new(),
            secret_envs: Vec::new(),
        })
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment override.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Add an environment override whose value is kept out of logs.
    #[must_use]
    pub fn secret_env(mut self, key: impl Into<String>, value: SecretString) -> Self {
        self.secret_envs.push((key.into(), value));
        self
    }

    /// Names of every overridden variable.
    #[must_use]
    pub fn env_keys(&self) -> Vec<&str> {
        self.envs
            .iter()
            .map(|(k, _)| k.as_str())
            .chain(self.secret_envs.iter().map(|(k, _)| k.as_str()))
            .collect()
    }

    /// Value of a non-secret override.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Process exited. `None` when it was terminated by a signal.
    Exited(Option<i32>),
    /// Process could not be started or waited on.
    SpawnFailed,
    /// Process exceeded its timeout and was killed.
    TimedOut(Duration),
}

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    /// True only for a zero exit status.
    pub success: bool,
    /// How the process ended.
    pub status: OutcomeStatus,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Human-readable exit or failure detail.
    pub detail: String,
}

impl StageOutcome {
    /// Assemble an outcome, deriving `success` and `detail` from the status.
    #[must_use]
    pub fn from_parts(
        status: OutcomeStatus,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        let (success, detail) = match status {
            OutcomeStatus::Exited(Some(code)) => (code == 0, format!("exit status: {code}")),
            OutcomeStatus::Exited(None) => (false, "terminated by signal".to_string()),
            OutcomeStatus::SpawnFailed => (false, "failed to start".to_string()),
            OutcomeStatus::TimedOut(after) => {
                (false, format!("timed out after {}s", after.as_secs()))
            }
        };
        Self {
            success,
            status,
            stdout: stdout.into(),
            stderr: stderr.into(),
            detail,
        }
    }

    fn from_exit(status: ExitStatus, stdout: String, stderr: String) -> Self {
        Self::from_parts(OutcomeStatus::Exited(status.code()), stdout, stderr)
    }
}

/// Runs external commands on behalf of the pipeline.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion or until `timeout` elapses.
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> StageOutcome;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl TokioRunner {
    /// Create a new runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        for (key, value) in &spec.envs {
            command.env(key, value);
        }
        for (key, value) in &spec.secret_envs {
            command.env(key, value.expose());
        }
        command
    }
}

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> StageOutcome {
        debug!(
            program = %spec.program,
            args = ?spec.args,
            cwd = %spec.cwd.display(),
            env = ?spec.env_keys(),
            "Spawning command"
        );

        let mut child = match Self::command(spec).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start {}: {}", spec.program, e);
                return StageOutcome::from_parts(
                    OutcomeStatus::SpawnFailed,
                    "",
                    format!("{}: {e}", spec.program),
                );
            }
        };

        // Taken now: once the child is reaped `id()` is gone, but its group
        // may still hold grandchildren.
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let finished = tokio::time::timeout(timeout, async {
            let (status, stdout, stderr) =
                tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
            status.map(|status| (status, stdout, stderr))
        })
        .await;

        match finished {
            Ok(Ok((status, stdout, stderr))) => StageOutcome::from_exit(status, stdout, stderr),
            Ok(Err(e)) => StageOutcome::from_parts(
                OutcomeStatus::SpawnFailed,
                "",
                format!("{}: {e}", spec.program),
            ),
            Err(_) => {
                warn!("{} timed out after {:?}", spec.program, timeout);
                terminate(&mut child, pid).await;
                StageOutcome::from_parts(OutcomeStatus::TimedOut(timeout), "", "")
            }
        }
    }
}

async fn read_pipe(pipe: Option<impl AsyncRead + Unpin>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Failed to read child output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Kill the child's process group, then the child itself, and reap it.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_process_group(pid);
    if let Err(e) = child.kill().await {
        debug!("Failed to kill timed out child: {}", e);
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(Ok(raw)) = pid.map(i32::try_from) else {
        return;
    };
    // The child leads its group, so the group id is its pid.
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!("killpg({}) failed: {}", raw, e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
