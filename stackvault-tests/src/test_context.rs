//! Test context and harness for pipeline tests
//!
//! Provides a unified context for setting up a temp-dir rooted configuration,
//! populating the registry, and wiring managers to mocks.

use crate::config_builder::{self, ConfigBuilder};
use stackvault::config::Config;
use stackvault::managers::backup::BackupManager;
use stackvault::managers::notification::NotificationManager;
use stackvault::managers::restore::RestoreManager;
use stackvault::registry::{Target, TargetRegistry};
use stackvault::secrets::mock::StaticSecrets;
use stackvault::utils::executor::mock::MockRunner;
use stackvault::utils::executor::CommandRunner;
use stackvault::utils::restic_ops::mock::MockSnapshotStore;
use stackvault::utils::restic_ops::SnapshotStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Test context that manages test resources and provides common utilities
pub struct TestContext {
    /// Temporary directory holding every configured path
    temp_dir: TempDir,
    config: Config,
    secrets: StaticSecrets,
}

impl TestContext {
    /// Create a new test context with the default test configuration
    pub fn new() -> Self {
        Self::from_builder(ConfigBuilder::new())
    }

    /// Create a test context from a ConfigBuilder
    pub fn from_builder(builder: ConfigBuilder) -> Self {
        let (config, temp_dir) = builder.persist();
        Self {
            temp_dir,
            config,
            secrets: StaticSecrets::new().with("PG_PASSWORD", "pg-secret"),
        }
    }

    /// Add a secret visible to the managers built from this context
    pub fn with_secret(mut self, var: &str, value: &str) -> Self {
        self.secrets = self.secrets.with(var, value);
        self
    }

    /// Get the temporary directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> TargetRegistry {
        TargetRegistry::new(&self.config.paths.registry_dir)
    }

    /// Register a target, panicking on validation errors
    pub fn add_target(&self, target: Target) {
        self.registry()
            .add_target(target)
            .expect("Failed to add target");
    }

    /// Write the configuration to `config.toml` and return its path
    pub fn write_config(&self) -> PathBuf {
        config_builder::write_config(&self.config, self.temp_dir.path())
    }

    /// Create a subdirectory in the temp dir
    pub fn create_subdir(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::create_dir_all(&path).expect("Failed to create subdirectory");
        path
    }

    pub fn staging_dir(&self) -> &Path {
        &self.config.paths.staging_dir
    }

    pub fn backup_manager(&self, runner: &MockRunner, store: &MockSnapshotStore) -> BackupManager {
        self.backup_manager_with(Arc::new(runner.clone()), store)
    }

    /// Backup manager around any runner, e.g. the real one
    pub fn backup_manager_with(
        &self,
        runner: Arc<dyn CommandRunner>,
        store: &MockSnapshotStore,
    ) -> BackupManager {
        let store: Arc<dyn SnapshotStore> = Arc::new(store.clone());
        BackupManager::new(
            self.config.clone(),
            runner,
            store,
            Arc::new(self.secrets.clone()),
            NotificationManager::with_sinks(Vec::new(), false),
        )
    }

    pub fn restore_manager(&self, runner: &MockRunner, store: &MockSnapshotStore) -> RestoreManager {
        self.restore_manager_with(Arc::new(runner.clone()), store)
    }

    pub fn restore_manager_with(
        &self,
        runner: Arc<dyn CommandRunner>,
        store: &MockSnapshotStore,
    ) -> RestoreManager {
        let store: Arc<dyn SnapshotStore> = Arc::new(store.clone());
        RestoreManager::new(
            self.config.clone(),
            runner,
            store,
            Arc::new(self.secrets.clone()),
            NotificationManager::with_sinks(Vec::new(), false),
        )
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
