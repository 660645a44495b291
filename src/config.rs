//! Configuration for dkim-verify.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listener configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Pipeline directories, commands and timeouts.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Values handed to the prover process.
    #[serde(default)]
    pub prover: ProverConfig,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port (0 for auto-select).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Pipeline configuration.
///
/// Commands are argv vectors. The normalize command gets the staged
/// artifact path appended as its final argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory uploads are staged into under their original name.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Directory the build step runs in.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Directory the prover runs in.
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,

    /// Line-ending normalizer. Empty uses the built-in CRLF to LF rewrite.
    #[serde(default = "default_normalize_command")]
    pub normalize_command: Vec<String>,

    /// Toolchain build step.
    #[serde(default = "default_build_command")]
    pub build_command: Vec<String>,

    /// Proof generation and verification step.
    #[serde(default = "default_prove_command")]
    pub prove_command: Vec<String>,

    /// Normalize timeout in seconds.
    #[serde(default = "default_normalize_timeout")]
    pub normalize_timeout_secs: u64,

    /// Build timeout in seconds.
    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,

    /// Prove timeout in seconds.
    #[serde(default = "default_prove_timeout")]
    pub prove_timeout_secs: u64,

    /// Fail a request immediately when another run is in flight instead
    /// of queueing it.
    #[serde(default)]
    pub reject_when_busy: bool,
}

/// Prover environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverConfig {
    /// Value of `SP1_PROVER` (e.g. `network`, `local`, `mock`).
    #[serde(default = "default_prover_mode")]
    pub mode: String,

    /// Value of `RUST_LOG` for the prover process.
    #[serde(default = "default_prover_log")]
    pub log: String,

    /// Value of `SP1_PRIVATE_KEY`. Never read from or written to files.
    #[serde(skip)]
    pub private_key: Option<SecretString>,
}

/// String whose value is hidden from `Debug` and `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Only the prover environment should need this.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(<redacted>)")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            build_dir: default_build_dir(),
            project_dir: default_project_dir(),
            normalize_command: default_normalize_command(),
            build_command: default_build_command(),
            prove_command: default_prove_command(),
            normalize_timeout_secs: default_normalize_timeout(),
            build_timeout_secs: default_build_timeout(),
            prove_timeout_secs: default_prove_timeout(),
            reject_when_busy: false,
        }
    }
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            mode: default_prover_mode(),
            log: default_prover_log(),
            private_key: None,
        }
    }
}

impl PipelineConfig {
    /// Normalize stage timeout.
    #[must_use]
    pub fn normalize_timeout(&self) -> Duration {
        Duration::from_secs(self.normalize_timeout_secs)
    }

    /// Build stage timeout.
    #[must_use]
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    /// Prove stage timeout.
    #[must_use]
    pub fn prove_timeout(&self) -> Duration {
        Duration::from_secs(self.prove_timeout_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    5000
}

const fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("script")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("program")
}

fn default_project_dir() -> PathBuf {
    PathBuf::from("script")
}

fn default_normalize_command() -> Vec<String> {
    vec!["dos2unix".to_string()]
}

fn default_build_command() -> Vec<String> {
    ["cargo", "prove", "build"].map(String::from).to_vec()
}

fn default_prove_command() -> Vec<String> {
    ["cargo", "run", "--release", "--", "--prove"]
        .map(String::from)
        .to_vec()
}

const fn default_normalize_timeout() -> u64 {
    60
}

const fn default_build_timeout() -> u64 {
    30 * 60
}

const fn default_prove_timeout() -> u64 {
    60 * 60
}

fn default_prover_mode() -> String {
    "network".to_string()
}

fn default_prover_log() -> String {
    "info".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file. The private key is never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that every configured command has a program to run.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first empty command.
    pub fn validate(&self) -> crate::Result<()> {
        if self.pipeline.build_command.is_empty() {
            return Err(crate::Error::Config("build_command is empty".to_string()));
        }
        if self.pipeline.prove_command.is_empty() {
            return Err(crate::Error::Config("prove_command is empty".to_string()));
        }
        Ok(())
    }
}
