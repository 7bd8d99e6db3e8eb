//! Test utilities for stackvault
//!
//! This crate provides shared test utilities, builders for configurations
//! and targets, and re-exports of the mock runner, snapshot store and secret
//! resolver shipped by the main crate.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{MockRunner, MockSnapshotStore, TargetBuilder, TestContext};
//!
//! #[test]
//! fn my_test() {
//!     let ctx = TestContext::new();
//!     ctx.add_target(TargetBuilder::postgres("main").container("pg").databases(&["app"]).build());
//!     let report = ctx
//!         .backup_manager(&MockRunner::new(), &MockSnapshotStore::new())
//!         .run(BackupScope::All, None);
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod target_builder;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use target_builder::TargetBuilder;
pub use test_context::TestContext;

// Re-export types from the main crate for convenience
pub use stackvault::config::{Config, RetentionPolicy};
pub use stackvault::registry::{Engine, Mode, Target, TargetRegistry};
pub use stackvault::utils::restic::Snapshot;

// Re-export mock implementations from the main crate
pub use stackvault::secrets::mock::StaticSecrets;
pub use stackvault::utils::executor::mock::{MockResponse, MockRunner, RecordedCall};
pub use stackvault::utils::restic_ops::mock::{MockSnapshotStore, StoreCall};

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
