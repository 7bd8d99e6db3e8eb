//! Configuration module for stackvault
//!
//! One TOML file holds the snapshot store, local paths, retention, timeouts,
//! logging and notification settings. Backup targets live in the registry
//! files under `paths.registry_dir`, not here.
//!
//! ## Example Usage
//!
//! ```no_run
//! use stackvault::config;
//!
//! let config = config::load_config("/etc/stackvault/config.toml")?;
//! println!("Repository: {}", config.store.repository);
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{load_config, parse_config, ConfigError, Result};
pub use types::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Used when neither `--config` nor `STACKVAULT_CONFIG` is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/stackvault/config.toml";

impl TimeoutConfig {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }

    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_timeout_seconds)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_timeout_seconds)
    }

    pub fn settle_poll(&self) -> Duration {
        Duration::from_secs(self.settle_poll_seconds)
    }
}

/// Expand tilde (~) in path
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
