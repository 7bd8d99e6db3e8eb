//! File-based locking so two operations never touch the same target at once

use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// An advisory lock file; guards borrow it for as long as the lock is held
pub struct FileLock {
    lock: RwLock<File>,
    path: PathBuf,
}

impl FileLock {
    /// Open (or create) the lock file at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lock directory: {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {:?}", path))?;

        Ok(Self {
            lock: RwLock::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Lock file for one target under `lock_dir`
    pub fn for_target(lock_dir: &Path, target_id: &str) -> Result<Self> {
        let file_name = format!("{}.lock", target_id.replace('/', "--"));
        Self::open(&lock_dir.join(file_name))
    }

    /// Take the lock without waiting; fails if another process holds it
    pub fn try_acquire(&mut self, holder: &str) -> Result<RwLockWriteGuard<'_, File>> {
        debug!("Attempting to acquire lock: {:?}", self.path);
        let path = self.path.clone();
        self.lock
            .try_write()
            .with_context(|| format!("'{}' is already in use (lock held: {:?})", holder, path))
    }

    /// Wait until the lock is available
    pub fn acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        debug!("Waiting for lock: {:?}", self.path);
        let path = self.path.clone();
        self.lock
            .write()
            .with_context(|| format!("Failed to lock {:?}", path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
