//! Error taxonomy for backup and restore operations

use crate::registry::{Engine, Mode, RegistryError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Malformed or missing registry entry; fatal before any external call
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// External command failed or timed out (no exit code on timeout)
    #[error("{backend} command for {target} failed{}: {stderr}", exit_suffix(.exit_code))]
    ExecutionFailed {
        target: String,
        backend: Mode,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Expected artifact '{artifact}' for {target} not found under {searched:?}")]
    ArtifactNotFound {
        target: String,
        artifact: String,
        searched: PathBuf,
    },

    /// The snapshot store failed to ingest, restore or prune
    #[error("Snapshot store error: {0}")]
    SnapshotStore(String),

    /// A target's credential reference cannot be resolved; fails only that target
    #[error("Credential for {target} is not available: {detail}")]
    MissingCredential { target: String, detail: String },

    #[error("{engine} targets cannot be handled in {mode} mode: {reason}")]
    UnsupportedCombination {
        engine: Engine,
        mode: Mode,
        reason: String,
    },
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {}", code),
        None => String::new(),
    }
}

impl From<RegistryError> for BackupError {
    fn from(err: RegistryError) -> Self {
        BackupError::Configuration(err.to_string())
    }
}

impl BackupError {
    pub fn unsupported(engine: Engine, mode: Mode, reason: impl Into<String>) -> Self {
        BackupError::UnsupportedCombination {
            engine,
            mode,
            reason: reason.into(),
        }
    }

    /// Whether this error should abort the whole run rather than one target
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            BackupError::Configuration(_) | BackupError::SnapshotStore(_)
        )
    }
}
