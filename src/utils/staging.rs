//! Staging tree layout
//!
//! `<root>/<engine>/<target>/<unit>/<stamp>/<artifact>`: one directory per
//! logical unit and run, so artifacts from different runs never collide.

use crate::error::BackupError;
use crate::registry::Engine;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Directory name for one run
pub fn run_stamp(now: DateTime<Utc>) -> String {
    now.format(STAMP_FORMAT).to_string()
}

#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start from an empty tree; leftovers of an interrupted run are discarded
    pub fn prepare(&self) -> std::io::Result<()> {
        if self.root.exists() {
            warn!("Removing stale staging tree {:?}", self.root);
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)
    }

    pub fn unit_dir(&self, engine: Engine, target: &str, unit: &str, stamp: &str) -> PathBuf {
        self.root
            .join(engine.as_str())
            .join(target)
            .join(unit)
            .join(stamp)
    }

    /// Snapshot path prefix holding a target's (or one unit's) artifacts
    pub fn include_pattern(&self, engine: Engine, target: &str, unit: Option<&str>) -> String {
        let mut path = self.root.join(engine.as_str()).join(target);
        if let Some(unit) = unit {
            path = path.join(unit);
        }
        path.display().to_string()
    }

    /// Whether anything was staged
    pub fn has_artifacts(&self) -> bool {
        fn any_file(dir: &Path) -> bool {
            fs::read_dir(dir)
                .map(|entries| {
                    entries.filter_map(|e| e.ok()).any(|e| {
                        let path = e.path();
                        if path.is_dir() {
                            any_file(&path)
                        } else {
                            !is_partial(&path)
                        }
                    })
                })
                .unwrap_or(false)
        }
        any_file(&self.root)
    }

    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
            debug!("Removed staging tree {:?}", self.root);
        }
        Ok(())
    }
}

/// Where a dump writes before it is accepted
pub fn partial_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

fn is_partial(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "partial")
}

/// Accept a finished dump: rename `<artifact>.partial` into place.
///
/// Missing or empty output (including a gzip stream with no payload) is
/// rejected and the partial file removed.
pub fn finalize_artifact(target_id: &str, artifact: &Path) -> Result<u64, BackupError> {
    let partial = partial_path(artifact);
    let not_found = |detail: &str| BackupError::ArtifactNotFound {
        target: target_id.to_string(),
        artifact: format!(
            "{} ({})",
            artifact
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            detail
        ),
        searched: artifact.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let size = match fs::metadata(&partial) {
        Ok(meta) => meta.len(),
        Err(_) => return Err(not_found("no output produced")),
    };

    if size == 0 || (is_gzip(artifact) && gzip_payload_empty(&partial)) {
        let _ = fs::remove_file(&partial);
        return Err(not_found("dump output was empty"));
    }

    fs::rename(&partial, artifact)
        .map_err(|e| BackupError::Configuration(format!("failed to stage {:?}: {}", artifact, e)))?;
    Ok(size)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

fn gzip_payload_empty(path: &Path) -> bool {
    let Ok(file) = fs::File::open(path) else {
        return true;
    };
    let mut byte = [0u8; 1];
    !matches!(GzDecoder::new(file).read(&mut byte), Ok(1))
}

/// Find the newest staged copy of `artifact` for a unit inside a restored tree.
///
/// `restored_root` is the directory the snapshot was restored into; the staging
/// tree appears under it at its original absolute path.
pub fn locate_artifact(
    restored_root: &Path,
    staging: &StagingArea,
    engine: Engine,
    target: &str,
    unit: &str,
    artifact: &str,
) -> Result<PathBuf, BackupError> {
    let staged_root = staging.root();
    let relative = staged_root.strip_prefix("/").unwrap_or(staged_root);
    let unit_root = restored_root
        .join(relative)
        .join(engine.as_str())
        .join(target)
        .join(unit);

    let mut stamps: Vec<String> = fs::read_dir(&unit_root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    // Stamps sort chronologically
    stamps.sort_unstable_by(|a, b| b.cmp(a));

    stamps
        .iter()
        .map(|stamp| unit_root.join(stamp).join(artifact))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| BackupError::ArtifactNotFound {
            target: format!("{}/{}", engine, target),
            artifact: artifact.to_string(),
            searched: unit_root,
        })
}
