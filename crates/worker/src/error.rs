use std::path::PathBuf;

use hazard_core::HazardError;
use hazard_store::StoreError;

/// Malformed or missing environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has invalid value \"{value}\": {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot read project file {path}: {source}")]
    ProjectIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid project file {path}: {reason}")]
    Project { path: PathBuf, reason: String },

    #[error(transparent)]
    Hazard(#[from] HazardError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkerError {
    /// `true` when a unit should be skipped rather than counted as failed.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::Hazard(e) if e.is_skippable())
    }
}
