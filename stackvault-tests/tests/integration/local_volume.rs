//! Path-mode volume round trip with the real process runner
//!
//! Exercises real `tar` and `find` against a temp directory; the snapshot
//! store is the archiving mock.

use stackvault::managers::backup::BackupScope;
use stackvault::managers::restore::{FixedConfirmer, RestoreOutcome, RestoreRequest};
use stackvault::registry::Engine;
use stackvault::utils::executor::RealRunner;
use std::fs;
use std::sync::Arc;
use test_utils::{MockSnapshotStore, TargetBuilder, TestContext};

use super::common::tool_exists;

#[test]
fn test_volume_backup_and_restore_round_trip() {
    if !tool_exists("tar") || !tool_exists("find") {
        eprintln!("Skipping test: tar or find not available");
        return;
    }

    let ctx = TestContext::new();
    let data = ctx.create_subdir("uploads");
    fs::write(data.join("avatar.png"), b"\x89PNG fake image").unwrap();
    fs::create_dir_all(data.join("docs")).unwrap();
    fs::write(data.join("docs/readme.txt"), "hello").unwrap();
    ctx.add_target(TargetBuilder::volume("uploads", &data).build());

    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    let runner = Arc::new(RealRunner::new().unwrap());

    let report = ctx
        .backup_manager_with(runner.clone(), &store)
        .run(BackupScope::Volumes, None);
    assert_eq!(report.exit_code(), 0, "{}", report.summary_line());
    let snapshot = report.snapshot_id.unwrap();

    // Damage the live data
    fs::remove_file(data.join("avatar.png")).unwrap();
    fs::write(data.join("docs/readme.txt"), "overwritten").unwrap();
    fs::write(data.join("stray.tmp"), "stray").unwrap();

    let request = RestoreRequest {
        engine: Engine::Volume,
        snapshot,
        target: "uploads".to_string(),
        unit: None,
    };
    let outcome = ctx
        .restore_manager_with(runner, &store)
        .restore_target(&request, &FixedConfirmer("yes".to_string()))
        .unwrap();
    assert!(matches!(outcome, RestoreOutcome::Restored(_)));

    assert_eq!(fs::read(data.join("avatar.png")).unwrap(), b"\x89PNG fake image");
    assert_eq!(fs::read_to_string(data.join("docs/readme.txt")).unwrap(), "hello");
    assert!(!data.join("stray.tmp").exists());
}

#[test]
fn test_volume_restore_declined_leaves_data_alone() {
    if !tool_exists("tar") {
        eprintln!("Skipping test: tar not available");
        return;
    }

    let ctx = TestContext::new();
    let data = ctx.create_subdir("uploads");
    fs::write(data.join("file.txt"), "original").unwrap();
    ctx.add_target(TargetBuilder::volume("uploads", &data).build());

    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    let runner = Arc::new(RealRunner::new().unwrap());
    let report = ctx
        .backup_manager_with(runner.clone(), &store)
        .run(BackupScope::All, None);
    let snapshot = report.snapshot_id.unwrap();

    fs::write(data.join("file.txt"), "changed").unwrap();

    let request = RestoreRequest {
        engine: Engine::Volume,
        snapshot,
        target: "uploads".to_string(),
        unit: None,
    };
    let outcome = ctx
        .restore_manager_with(runner, &store)
        .restore_target(&request, &FixedConfirmer("no".to_string()))
        .unwrap();

    assert!(matches!(outcome, RestoreOutcome::Cancelled));
    assert_eq!(fs::read_to_string(data.join("file.txt")).unwrap(), "changed");
}
