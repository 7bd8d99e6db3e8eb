//! Snapshot store abstraction for testability
//!
//! The pipelines talk to the store through [`SnapshotStore`]; the real
//! implementation is [`super::restic::ResticStore`].

use crate::config::RetentionPolicy;
use crate::error::BackupError;
use std::path::Path;

pub use super::restic::Snapshot;

pub trait SnapshotStore: Send + Sync {
    /// Whether the store's client binary is installed
    fn available(&self) -> bool;

    /// `Ok(false)` when the repository does not exist yet; `Err` when it cannot be reached
    fn is_initialized(&self) -> Result<bool, BackupError>;

    fn init(&self) -> Result<(), BackupError>;

    /// Ingest a directory tree as one snapshot; returns the new snapshot id if reported
    fn backup(
        &self,
        path: &Path,
        tags: &[String],
        host: Option<&str>,
    ) -> Result<Option<String>, BackupError>;

    fn snapshots(&self) -> Result<Vec<Snapshot>, BackupError>;

    /// Paths recorded in a snapshot
    fn ls(&self, snapshot_id: &str) -> Result<Vec<String>, BackupError>;

    /// Restore the paths matching `include` (everything if empty) under `target`
    fn restore(
        &self,
        snapshot_id: &str,
        target: &Path,
        include: &[String],
    ) -> Result<(), BackupError>;

    /// Apply a keep-count policy and prune unreferenced data
    fn forget(&self, policy: &RetentionPolicy) -> Result<(), BackupError>;
}

/// Mock implementation for testing
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// Recorded operation call
    #[derive(Clone, Debug, PartialEq)]
    pub enum StoreCall {
        IsInitialized,
        Init,
        Backup {
            path: PathBuf,
            tags: Vec<String>,
            host: Option<String>,
        },
        Snapshots,
        Ls {
            snapshot_id: String,
        },
        Restore {
            snapshot_id: String,
            target: PathBuf,
            include: Vec<String>,
        },
        Forget {
            policy: RetentionPolicy,
        },
    }

    /// In-memory snapshot store.
    ///
    /// With [`MockSnapshotStore::with_archive`] every backup copies the ingested
    /// tree into the archive directory, and restores copy it back out, so whole
    /// backup/restore cycles can run without restic.
    #[derive(Clone)]
    pub struct MockSnapshotStore {
        pub calls: Arc<Mutex<Vec<StoreCall>>>,
        pub snapshots: Arc<Mutex<Vec<Snapshot>>>,
        initialized: Arc<Mutex<bool>>,
        available: bool,
        unreachable: bool,
        fail_init: bool,
        fail_backup: bool,
        fail_restore: bool,
        fail_forget: bool,
        archive: Option<PathBuf>,
    }

    impl Default for MockSnapshotStore {
        fn default() -> Self {
            Self {
                calls: Arc::default(),
                snapshots: Arc::default(),
                initialized: Arc::new(Mutex::new(true)),
                available: true,
                unreachable: false,
                fail_init: false,
                fail_backup: false,
                fail_restore: false,
                fail_forget: false,
                archive: None,
            }
        }
    }

    impl MockSnapshotStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_snapshots(self, snapshots: Vec<Snapshot>) -> Self {
            *self.snapshots.lock().unwrap() = snapshots;
            self
        }

        /// Start with no repository, so the first run has to initialize it
        pub fn uninitialized(self) -> Self {
            *self.initialized.lock().unwrap() = false;
            self
        }

        pub fn unavailable(mut self) -> Self {
            self.available = false;
            self
        }

        pub fn unreachable(mut self) -> Self {
            self.unreachable = true;
            self
        }

        pub fn with_failing_init(mut self) -> Self {
            self.fail_init = true;
            self
        }

        pub fn with_failing_backup(mut self) -> Self {
            self.fail_backup = true;
            self
        }

        pub fn with_failing_restore(mut self) -> Self {
            self.fail_restore = true;
            self
        }

        pub fn with_failing_forget(mut self) -> Self {
            self.fail_forget = true;
            self
        }

        /// Keep ingested trees under `dir` so they can be restored later
        pub fn with_archive(mut self, dir: &Path) -> Self {
            self.archive = Some(dir.to_path_buf());
            self
        }

        pub fn get_calls(&self) -> Vec<StoreCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn init_called(&self) -> bool {
            self.get_calls().iter().any(|c| matches!(c, StoreCall::Init))
        }

        pub fn backup_calls(&self) -> Vec<StoreCall> {
            self.get_calls()
                .into_iter()
                .filter(|c| matches!(c, StoreCall::Backup { .. }))
                .collect()
        }

        pub fn forget_called(&self) -> bool {
            self.get_calls()
                .iter()
                .any(|c| matches!(c, StoreCall::Forget { .. }))
        }

        pub fn restore_called(&self) -> bool {
            self.get_calls()
                .iter()
                .any(|c| matches!(c, StoreCall::Restore { .. }))
        }

        fn record_call(&self, call: StoreCall) {
            self.calls.lock().unwrap().push(call);
        }

        fn failure(&self, what: &str) -> BackupError {
            BackupError::SnapshotStore(format!("Mock {} failure", what))
        }

        /// `/a/b` -> `<base>/a/b`
        fn rooted(base: &Path, absolute: &Path) -> PathBuf {
            base.join(absolute.strip_prefix("/").unwrap_or(absolute))
        }

        fn copy_tree(from: &Path, to: &Path, filter: &dyn Fn(&Path) -> bool) -> std::io::Result<()> {
            for entry in fs::read_dir(from)? {
                let entry = entry?;
                let source = entry.path();
                let dest = to.join(entry.file_name());
                if entry.file_type()?.is_dir() {
                    Self::copy_tree(&source, &dest, filter)?;
                } else if filter(&source) {
                    if let Some(parent) = dest.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::copy(&source, &dest)?;
                }
            }
            Ok(())
        }
    }

    impl SnapshotStore for MockSnapshotStore {
        fn available(&self) -> bool {
            self.available
        }

        fn is_initialized(&self) -> Result<bool, BackupError> {
            self.record_call(StoreCall::IsInitialized);
            if self.unreachable {
                return Err(self.failure("reachability"));
            }
            Ok(*self.initialized.lock().unwrap())
        }

        fn init(&self) -> Result<(), BackupError> {
            self.record_call(StoreCall::Init);
            if self.fail_init {
                return Err(self.failure("init"));
            }
            *self.initialized.lock().unwrap() = true;
            Ok(())
        }

        fn backup(
            &self,
            path: &Path,
            tags: &[String],
            host: Option<&str>,
        ) -> Result<Option<String>, BackupError> {
            self.record_call(StoreCall::Backup {
                path: path.to_path_buf(),
                tags: tags.to_vec(),
                host: host.map(str::to_string),
            });
            if self.fail_backup {
                return Err(self.failure("backup"));
            }

            let mut snapshots = self.snapshots.lock().unwrap();
            let id = format!("{:08x}", snapshots.len() + 1);

            if let Some(ref archive) = self.archive {
                let dest = Self::rooted(&archive.join(&id), path);
                Self::copy_tree(path, &dest, &|_| true)
                    .map_err(|e| BackupError::SnapshotStore(e.to_string()))?;
            }

            snapshots.push(Snapshot {
                id: id.clone(),
                short_id: id.clone(),
                time: chrono::Utc::now().to_rfc3339(),
                hostname: host.unwrap_or("mock").to_string(),
                tags: tags.to_vec(),
                paths: vec![path.display().to_string()],
            });
            Ok(Some(id))
        }

        fn snapshots(&self) -> Result<Vec<Snapshot>, BackupError> {
            self.record_call(StoreCall::Snapshots);
            Ok(self.snapshots.lock().unwrap().clone())
        }

        fn ls(&self, snapshot_id: &str) -> Result<Vec<String>, BackupError> {
            self.record_call(StoreCall::Ls {
                snapshot_id: snapshot_id.to_string(),
            });
            let snapshots = self.snapshots.lock().unwrap();
            let snapshot = snapshots
                .iter()
                .find(|s| s.matches(snapshot_id))
                .ok_or_else(|| self.failure("unknown snapshot"))?;
            Ok(snapshot.paths.clone())
        }

        fn restore(
            &self,
            snapshot_id: &str,
            target: &Path,
            include: &[String],
        ) -> Result<(), BackupError> {
            self.record_call(StoreCall::Restore {
                snapshot_id: snapshot_id.to_string(),
                target: target.to_path_buf(),
                include: include.to_vec(),
            });
            if self.fail_restore {
                return Err(self.failure("restore"));
            }

            if let Some(ref archive) = self.archive {
                let root = archive.join(snapshot_id);
                if !root.exists() {
                    return Err(self.failure("unknown snapshot"));
                }
                let matches = |file: &Path| {
                    let original = Path::new("/").join(file.strip_prefix(&root).unwrap_or(file));
                    include.is_empty() || include.iter().any(|p| original.starts_with(p))
                };
                Self::copy_tree(&root, target, &matches)
                    .map_err(|e| BackupError::SnapshotStore(e.to_string()))?;
            }
            Ok(())
        }

        fn forget(&self, policy: &RetentionPolicy) -> Result<(), BackupError> {
            self.record_call(StoreCall::Forget {
                policy: policy.clone(),
            });
            if self.fail_forget {
                return Err(self.failure("forget"));
            }
            Ok(())
        }
    }
}
