//! Command-line interface definition.

use clap::Parser;
use dkim_verify::config::{SecretString, ServiceConfig};
use std::path::PathBuf;

/// HTTP service that proves DKIM-signed payment emails with an SP1 toolchain.
#[derive(Parser, Debug)]
#[command(name = "dkim-verify")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to bind.
    #[arg(long, env = "DKIM_VERIFY_HOST")]
    pub host: Option<String>,

    /// Listening port.
    #[arg(long, short, env = "PORT")]
    pub port: Option<u16>,

    /// Directory uploads are staged into.
    #[arg(long, env = "DKIM_VERIFY_STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Directory `cargo prove build` runs in.
    #[arg(long, env = "DKIM_VERIFY_BUILD_DIR")]
    pub build_dir: Option<PathBuf>,

    /// Directory the prover runs in.
    #[arg(long, env = "DKIM_VERIFY_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    /// Prover mode passed as `SP1_PROVER`.
    #[arg(long, env = "SP1_PROVER")]
    pub prover_mode: Option<String>,

    /// Prover private key passed as `SP1_PRIVATE_KEY`.
    #[arg(long, env = "SP1_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Log filter for the prover process.
    #[arg(long, env = "DKIM_VERIFY_PROVER_LOG")]
    pub prover_log: Option<String>,

    /// Reject uploads while another verification is running.
    #[arg(long, env = "DKIM_VERIFY_REJECT_WHEN_BUSY")]
    pub reject_when_busy: bool,

    /// Log level. Overrides `log_level` from the config file.
    #[arg(long, env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, env = "DKIM_VERIFY_LOG_JSON")]
    pub log_json: bool,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Convert CLI arguments into a ServiceConfig.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<ServiceConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            ServiceConfig::from_file(path)?
        } else {
            ServiceConfig::default()
        };

        // Override with CLI arguments
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = self.staging_dir {
            config.pipeline.staging_dir = dir;
        }
        if let Some(dir) = self.build_dir {
            config.pipeline.build_dir = dir;
        }
        if let Some(dir) = self.project_dir {
            config.pipeline.project_dir = dir;
        }
        if let Some(mode) = self.prover_mode {
            config.prover.mode = mode;
        }
        if let Some(log) = self.prover_log {
            config.prover.log = log;
        }
        if self.reject_when_busy {
            config.pipeline.reject_when_busy = true;
        }

        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        config.prover.private_key = self.private_key.map(SecretString::new);

        Ok(config)
    }
}
