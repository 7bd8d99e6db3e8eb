//! Target registry
//!
//! One TOML file per engine (`<registry_dir>/<engine>.toml`) holding an ordered
//! `[[targets]]` list. Mutations are read-modify-write under a per-engine lock
//! and land on disk through a temp file that is renamed into place.

mod types;

pub use types::*;

use crate::utils::locker::FileLock;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Target '{name}' already exists for engine {engine}")]
    DuplicateTarget { engine: Engine, name: String },

    #[error("Invalid {mode} configuration for {engine} target '{name}': {reason}")]
    InvalidModeConfiguration {
        engine: Engine,
        name: String,
        mode: Mode,
        reason: String,
    },

    #[error("Target '{name}' not found for engine {engine}")]
    TargetNotFound { engine: Engine, name: String },

    #[error("Failed to read registry file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse registry file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Registry file {path:?} lists target '{name}' with engine {found}, expected {expected}")]
    EngineMismatch {
        path: PathBuf,
        name: String,
        expected: Engine,
        found: Engine,
    },

    #[error("Failed to serialize registry: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write registry file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to lock registry: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Durable, editable list of backup targets
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    dir: PathBuf,
}

impl TargetRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the registry file for an engine
    pub fn file_path(&self, engine: Engine) -> PathBuf {
        self.dir.join(format!("{}.toml", engine))
    }

    fn lock_path(&self, engine: Engine) -> PathBuf {
        self.dir.join(format!(".{}.lock", engine))
    }

    /// Every target for an engine (enabled or not), in file order, validated
    pub fn load(&self, engine: Engine) -> Result<Vec<Target>> {
        let path = self.file_path(engine);
        if !path.exists() {
            debug!("No registry file for {} at {:?}", engine, path);
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&path).map_err(|source| RegistryError::Read {
            path: path.clone(),
            source,
        })?;
        let file: RegistryFile =
            toml::from_str(&contents).map_err(|source| RegistryError::Parse {
                path: path.clone(),
                source,
            })?;

        let mut seen = std::collections::HashSet::new();
        for target in &file.targets {
            if target.engine != engine {
                return Err(RegistryError::EngineMismatch {
                    path: path.clone(),
                    name: target.name.clone(),
                    expected: engine,
                    found: target.engine,
                });
            }
            if !seen.insert(target.name.as_str()) {
                return Err(RegistryError::DuplicateTarget {
                    engine,
                    name: target.name.clone(),
                });
            }
            target.validate()?;
        }

        Ok(file.targets)
    }

    /// Enabled targets for an engine, in file order
    pub fn list_targets(&self, engine: Engine) -> Result<Vec<Target>> {
        Ok(self
            .load(engine)?
            .into_iter()
            .filter(|t| t.enabled)
            .collect())
    }

    /// Look up one target by (engine, name), enabled or not
    pub fn find(&self, engine: Engine, name: &str) -> Result<Target> {
        self.load(engine)?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| RegistryError::TargetNotFound {
                engine,
                name: name.to_string(),
            })
    }

    /// Append a target; the file is untouched if validation fails or the name is taken
    pub fn add_target(&self, target: Target) -> Result<()> {
        target.validate()?;
        let engine = target.engine;
        let name = target.name.clone();

        self.modify(engine, |targets| {
            if targets.iter().any(|t| t.name == target.name) {
                return Err(RegistryError::DuplicateTarget {
                    engine,
                    name: target.name.clone(),
                });
            }
            targets.push(target);
            Ok(())
        })?;

        info!("Added {} target '{}'", engine, name);
        Ok(())
    }

    /// Remove a target and return it
    pub fn remove_target(&self, engine: Engine, name: &str) -> Result<Target> {
        let mut removed = None;
        self.modify(engine, |targets| {
            let index = targets
                .iter()
                .position(|t| t.name == name)
                .ok_or_else(|| RegistryError::TargetNotFound {
                    engine,
                    name: name.to_string(),
                })?;
            removed = Some(targets.remove(index));
            Ok(())
        })?;

        info!("Removed {} target '{}'", engine, name);
        removed.ok_or_else(|| RegistryError::TargetNotFound {
            engine,
            name: name.to_string(),
        })
    }

    pub fn set_enabled(&self, engine: Engine, name: &str, enabled: bool) -> Result<()> {
        self.modify(engine, |targets| {
            let target = targets
                .iter_mut()
                .find(|t| t.name == name)
                .ok_or_else(|| RegistryError::TargetNotFound {
                    engine,
                    name: name.to_string(),
                })?;
            target.enabled = enabled;
            Ok(())
        })?;

        info!(
            "{} {} target '{}'",
            if enabled { "Enabled" } else { "Disabled" },
            engine,
            name
        );
        Ok(())
    }

    /// Read-modify-write under the engine lock. Nothing is written if `change` fails.
    fn modify<F>(&self, engine: Engine, change: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Target>) -> Result<()>,
    {
        fs::create_dir_all(&self.dir).map_err(|source| RegistryError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let mut lock =
            FileLock::open(&self.lock_path(engine)).map_err(|e| RegistryError::Lock(format!("{:#}", e)))?;
        let _guard = lock
            .acquire()
            .map_err(|e| RegistryError::Lock(format!("{:#}", e)))?;

        let mut targets = self.load(engine)?;
        change(&mut targets)?;
        self.store(engine, &targets)
    }

    fn store(&self, engine: Engine, targets: &[Target]) -> Result<()> {
        let path = self.file_path(engine);
        let contents = toml::to_string_pretty(&RegistryFile {
            targets: targets.to_vec(),
        })?;

        let write_err = |source| RegistryError::Write {
            path: path.clone(),
            source,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(contents.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        debug!("Wrote {} target(s) to {:?}", targets.len(), path);
        Ok(())
    }
}
