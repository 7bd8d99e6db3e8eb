use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Snapshot store (restic repository) settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Repository location passed as RESTIC_REPOSITORY
    pub repository: String,

    /// Name of the environment variable holding the passphrase
    #[serde(default)]
    pub password_env: Option<String>,

    #[serde(default)]
    pub password_file: Option<PathBuf>,

    /// Host label for snapshots; defaults to restic's own
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "default_binary")]
    pub binary: String,
}

/// Where registry files, staging and scratch trees live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    #[serde(default = "default_registry_dir")]
    pub registry_dir: PathBuf,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            registry_dir: default_registry_dir(),
            staging_dir: default_staging_dir(),
            scratch_dir: default_scratch_dir(),
            lock_dir: default_lock_dir(),
        }
    }
}

/// Keep-counts handed to `restic forget`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetentionPolicy {
    #[serde(default)]
    pub hourly: u32,
    #[serde(default = "default_retention_daily")]
    pub daily: u32,
    #[serde(default = "default_retention_weekly")]
    pub weekly: u32,
    #[serde(default = "default_retention_monthly")]
    pub monthly: u32,
    #[serde(default = "default_retention_yearly")]
    pub yearly: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            hourly: 0,
            daily: default_retention_daily(),
            weekly: default_retention_weekly(),
            monthly: default_retention_monthly(),
            yearly: default_retention_yearly(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// Per external command run against a target
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    /// Per restic invocation
    #[serde(default = "default_store_timeout")]
    pub store_timeout_seconds: u64,
    /// Upper bound on waiting for a background save
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout_seconds: u64,
    #[serde(default = "default_settle_poll")]
    pub settle_poll_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_timeout_seconds: default_command_timeout(),
            store_timeout_seconds: default_store_timeout(),
            settle_timeout_seconds: default_settle_timeout(),
            settle_poll_seconds: default_settle_poll(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Run logs older than this are removed during cleanup
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_level: default_log_level(),
            log_retention_days: default_log_retention_days(),
        }
    }
}

/// Notification sinks; an empty value disables that sink
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub discord_webhook_url: String,

    #[serde(default)]
    pub slack_webhook_url: String,

    #[serde(default)]
    pub ntfy_url: String,
    #[serde(default)]
    pub ntfy_topic: String,
    /// Name of the environment variable holding an ntfy access token
    #[serde(default)]
    pub ntfy_token_env: Option<String>,

    /// Also send a summary when everything succeeded
    #[serde(default)]
    pub notify_on_success: bool,
}

// Default value functions

fn default_binary() -> String { "restic".to_string() }
fn default_registry_dir() -> PathBuf { PathBuf::from("/etc/stackvault/targets") }
fn default_staging_dir() -> PathBuf { PathBuf::from("/var/lib/stackvault/staging") }
fn default_scratch_dir() -> PathBuf { PathBuf::from("/var/lib/stackvault/restore") }
fn default_lock_dir() -> PathBuf { PathBuf::from("/var/lib/stackvault/locks") }
fn default_retention_daily() -> u32 { 7 }
fn default_retention_weekly() -> u32 { 4 }
fn default_retention_monthly() -> u32 { 6 }
fn default_retention_yearly() -> u32 { 1 }
fn default_command_timeout() -> u64 { 3600 }
fn default_store_timeout() -> u64 { 7200 }
fn default_settle_timeout() -> u64 { 300 }
fn default_settle_poll() -> u64 { 1 }
fn default_log_directory() -> PathBuf { PathBuf::from("/var/log/stackvault") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_retention_days() -> u32 { 30 }
