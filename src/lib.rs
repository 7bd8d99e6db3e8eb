//! Stackvault Library
//!
//! Backup and restore orchestration for databases and volumes across
//! container, orchestrated, network and path execution modes, with restic as
//! the snapshot store.

pub mod adapters;
pub mod backends;
pub mod config;
pub mod error;
pub mod managers;
pub mod registry;
pub mod secrets;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, Config};
pub use error::BackupError;
pub use managers::backup::{BackupManager, BackupScope};
pub use managers::logging::{init_console_logging, init_run_logging, LogGuard, LoggingConfig};
pub use managers::notification::NotificationManager;
pub use managers::report::{RunReport, RunStatus};
pub use managers::restore::{RestoreManager, RestoreOutcome, RestoreRequest};
pub use registry::{Engine, Mode, Target, TargetRegistry};
