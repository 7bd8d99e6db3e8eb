//! Fluent API for building test configurations
//!
//! Every path points inside one temporary directory, so tests never touch
//! `/etc` or `/var`.

use stackvault::config::{
    Config, LoggingSettings, NotificationConfig, PathsConfig, RetentionPolicy, StoreConfig,
    TimeoutConfig,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Environment variable the test configs name as the store passphrase source
pub const TEST_PASSWORD_ENV: &str = "STACKVAULT_TEST_PASSWORD";

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    config: Config,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with defaults rooted in a fresh temp dir
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();

        let paths = PathsConfig {
            registry_dir: root.join("targets"),
            staging_dir: root.join("staging"),
            scratch_dir: root.join("scratch"),
            lock_dir: root.join("locks"),
        };
        fs::create_dir_all(&paths.registry_dir).expect("Failed to create registry dir");

        let config = Config {
            store: StoreConfig {
                repository: root.join("repo").display().to_string(),
                password_env: Some(TEST_PASSWORD_ENV.to_string()),
                password_file: None,
                host: Some("test-host".to_string()),
                binary: "restic".to_string(),
            },
            paths,
            retention: RetentionPolicy::default(),
            timeouts: TimeoutConfig {
                command_timeout_seconds: 60,
                store_timeout_seconds: 60,
                settle_timeout_seconds: 2,
                settle_poll_seconds: 1,
            },
            logging: LoggingSettings {
                log_directory: root.join("logs"),
                log_level: "debug".to_string(),
                log_retention_days: 30,
            },
            notifications: NotificationConfig::default(),
        };

        Self { temp_dir, config }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.config.retention = retention;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationConfig) -> Self {
        self.config.notifications = notifications;
        self
    }

    pub fn with_password_file(mut self, password: &str) -> Self {
        let file = self.temp_dir.path().join("restic-password");
        fs::write(&file, password).expect("Failed to write password file");
        self.config.store.password_env = None;
        self.config.store.password_file = Some(file);
        self
    }

    /// Build the config and keep the temp dir alive alongside it
    pub fn persist(self) -> (Config, TempDir) {
        (self.config, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize `config` to `<dir>/config.toml` and return the path
pub fn write_config(config: &Config, dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    let contents = toml::to_string_pretty(config).expect("Failed to serialize config");
    fs::write(&path, contents).expect("Failed to write config");
    path
}
