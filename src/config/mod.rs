//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if a var is malformed. `SOURCE_URL` is
//! only checked by commands that talk to the gateway. The gateway token is
//! wrapped in secrecy::SecretString so it never reaches the logs.

pub mod mode;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::engine::WorkHours;
use crate::error::{Error, Result};

pub use mode::RunMode;

#[derive(Debug)]
pub struct Config {
    pub database_path: PathBuf,
    pub source_url: Option<String>,
    pub source_token: Option<SecretString>,
    pub workflow_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub work_hours: WorkHours,
    pub cycle_interval: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        let work_hours: WorkHours = optional_var("WORK_HOURS", "8-20").parse()?;
        let interval_secs: u64 = optional_var("CYCLE_INTERVAL_SECS", "900")
            .parse()
            .map_err(|e| Error::Config(format!("CYCLE_INTERVAL_SECS: {e}")))?;

        Ok(Self {
            database_path: optional_var("DATABASE_PATH", "logs/approval-relay.db").into(),
            source_url: std::env::var("SOURCE_URL").ok(),
            source_token: std::env::var("SOURCE_TOKEN").ok().map(SecretString::from),
            workflow_dir: optional_var("WORKFLOW_DIR", "workflows").into(),
            scratch_dir: optional_var("SCRATCH_DIR", "cache").into(),
            work_hours,
            cycle_interval: Duration::from_secs(interval_secs),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: optional_var("LOG_LEVEL", "info"),
        })
    }

    /// Gateway base URL, required by anything that polls.
    pub fn require_source_url(&self) -> Result<&str> {
        self.source_url.as_deref().ok_or_else(|| {
            Error::Config("required environment variable SOURCE_URL is not set".to_string())
        })
    }

    /// Database file for `mode`. Debug runs keep their own state next to
    /// the production file (`relay.db` becomes `relay_test.db`).
    pub fn database_path_for(&self, mode: &RunMode) -> PathBuf {
        if mode.debug {
            test_database_path(&self.database_path)
        } else {
            self.database_path.clone()
        }
    }

    /// Log filter for `mode`. Debug forces `debug` level.
    pub fn log_level_for(&self, mode: &RunMode) -> String {
        if mode.debug {
            "debug".to_string()
        } else {
            self.log_level.clone()
        }
    }
}

fn test_database_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_test.{}", ext.to_string_lossy()),
        None => format!("{stem}_test"),
    };
    path.with_file_name(name)
}

fn optional_var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
