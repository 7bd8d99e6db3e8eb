//! Unit tests for the restic-backed snapshot store
//!
//! These tests drive `ResticStore` through the mock runner and check the
//! command lines restic would see.

use stackvault::config::RetentionPolicy;
use stackvault::utils::restic::ResticStore;
use stackvault::utils::restic_ops::SnapshotStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{ConfigBuilder, MockResponse, MockRunner, StaticSecrets};

const PASSWORD: &str = "correct horse battery staple";

fn store(runner: &MockRunner) -> ResticStore {
    let (config, _temp_dir) = ConfigBuilder::new().persist();
    let secrets = StaticSecrets::new().with("STACKVAULT_TEST_PASSWORD", PASSWORD);
    ResticStore::new(
        Arc::new(runner.clone()),
        &config.store,
        &secrets,
        Duration::from_secs(30),
    )
    .unwrap()
}

#[test]
fn test_passphrase_travels_in_environment_only() {
    let runner = MockRunner::new().expect("snapshots", MockResponse::ok("[]"));
    store(&runner).snapshots().unwrap();

    let call = &runner.calls_matching("snapshots")[0];
    assert!(call.env_keys.contains(&"RESTIC_PASSWORD".to_string()));
    assert!(call.env_keys.contains(&"RESTIC_REPOSITORY".to_string()));
    assert!(!call.command_line().contains(PASSWORD));
}

#[test]
fn test_forget_always_keeps_latest_snapshot() {
    let runner = MockRunner::new();
    let policy = RetentionPolicy {
        hourly: 0,
        daily: 0,
        weekly: 0,
        monthly: 0,
        yearly: 0,
    };
    store(&runner).forget(&policy).unwrap();

    assert_eq!(
        runner.get_calls()[0].command_line(),
        "restic forget --keep-last 1 --prune"
    );
}

#[test]
fn test_restore_passes_include_patterns() {
    let runner = MockRunner::new();
    store(&runner)
        .restore(
            "abc123",
            Path::new("/tmp/scratch"),
            &["/var/lib/stackvault/staging/relational-pg/main".to_string()],
        )
        .unwrap();

    assert_eq!(
        runner.get_calls()[0].command_line(),
        "restic restore abc123 --target /tmp/scratch --include /var/lib/stackvault/staging/relational-pg/main"
    );
}

#[test]
fn test_failed_backup_is_snapshot_store_error() {
    let runner = MockRunner::new().expect("backup", MockResponse::fail(1, "Fatal: unable to save snapshot"));
    let err = store(&runner)
        .backup(Path::new("/staging"), &["automated".to_string()], None)
        .unwrap_err();

    assert!(err.is_run_fatal());
    assert!(err.to_string().contains("unable to save snapshot"));
}

#[test]
fn test_store_timeout_is_snapshot_store_error() {
    let runner = MockRunner::new().with_default_response(MockResponse::Timeout);
    let err = store(&runner).snapshots().unwrap_err();
    assert!(err.is_run_fatal());
}
