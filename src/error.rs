//! Error types for approval-relay.
//!
//! Each variant maps to one recovery policy in the cycle: fetch errors and
//! integrity errors skip the current instance, store errors skip the current
//! item, render errors leave the queue row in place for the next cycle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Remote instance source failed (network, gateway, API error).
    #[error("fetch failed: {0}")]
    TransientFetch(String),

    /// A remote record is missing a field the core relies on.
    #[error("instance {instance_id}: {reason}")]
    DataIntegrity { instance_id: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The render/print collaborator failed for one job.
    #[error("render failed: {0}")]
    Render(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn integrity(instance_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataIntegrity {
            instance_id: instance_id.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::TransientFetch(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
