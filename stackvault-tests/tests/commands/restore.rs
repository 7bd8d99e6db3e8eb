//! Tests for the 'restore' command
//!
//! Snapshots are produced by a real backup run against the archiving mock
//! store, then restored through a fresh mock runner.

use rstest::rstest;
use stackvault::managers::backup::BackupScope;
use stackvault::managers::restore::{
    Confirmer, FixedConfirmer, RestoreOutcome, RestoreRequest,
};
use stackvault::registry::Engine;
use std::fs;
use test_utils::{
    sample_snapshot, sample_snapshots, MockResponse, MockRunner, MockSnapshotStore, StoreCall,
    TargetBuilder, TestContext,
};

const APP_DUMP: &str = "CREATE TABLE users (id int);\n";
const BILLING_DUMP: &str = "CREATE TABLE invoices (id int);\n";

/// Fails the test if the pipeline ever asks for confirmation
struct NeverAsked;

impl Confirmer for NeverAsked {
    fn ask(&self, prompt: &str) -> anyhow::Result<String> {
        panic!("confirmation requested unexpectedly: {}", prompt)
    }
}

/// Back up `main` (databases app and billing) and return the snapshot id
fn backed_up(ctx: &TestContext, store: &MockSnapshotStore) -> String {
    ctx.add_target(
        TargetBuilder::postgres("main")
            .container("pg-main")
            .databases(&["app", "billing"])
            .credential("PG_PASSWORD")
            .build(),
    );
    let runner = MockRunner::new()
        .expect("-d app", MockResponse::ok(APP_DUMP))
        .expect("-d billing", MockResponse::ok(BILLING_DUMP));

    let report = ctx.backup_manager(&runner, store).run(BackupScope::All, None);
    assert_eq!(report.exit_code(), 0, "{}", report.summary_line());
    report.snapshot_id.expect("backup produced no snapshot")
}

fn request(snapshot: &str, unit: Option<&str>) -> RestoreRequest {
    RestoreRequest {
        engine: Engine::RelationalPg,
        snapshot: snapshot.to_string(),
        target: "main".to_string(),
        unit: unit.map(str::to_string),
    }
}

#[rstest]
#[case("no")]
#[case("YES")]
#[case("y")]
#[case("")]
fn test_restore_without_literal_changes_nothing(#[case] answer: &str) {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    let snapshot = backed_up(&ctx, &store);

    let runner = MockRunner::new();
    let outcome = ctx
        .restore_manager(&runner, &store)
        .restore_target(&request(&snapshot, None), &FixedConfirmer(answer.to_string()))
        .unwrap();

    assert!(matches!(outcome, RestoreOutcome::Cancelled));
    assert!(runner.get_calls().is_empty(), "no engine command may run");
}

#[test]
fn test_restore_all_units_after_confirmation() {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    let snapshot = backed_up(&ctx, &store);

    let runner = MockRunner::new();
    let outcome = ctx
        .restore_manager(&runner, &store)
        .restore_target(&request(&snapshot, None), &FixedConfirmer("yes".to_string()))
        .unwrap();

    let report = match outcome {
        RestoreOutcome::Restored(report) => report,
        RestoreOutcome::Cancelled => panic!("restore was cancelled"),
    };
    assert_eq!(
        report.succeeded,
        vec!["relational-pg/main/app", "relational-pg/main/billing"]
    );
    assert_eq!(report.snapshot_id.as_deref(), Some(snapshot.as_str()));

    let restores = runner.calls_matching("psql");
    assert_eq!(restores.len(), 2);
    assert_eq!(
        restores[0].command_line(),
        "docker exec -i -e PGPASSWORD pg-main psql -v ON_ERROR_STOP=1 -U postgres -d app"
    );
    assert_eq!(restores[0].stdin_data.as_deref(), Some(APP_DUMP.as_bytes()));
    assert_eq!(restores[1].stdin_data.as_deref(), Some(BILLING_DUMP.as_bytes()));
}

#[test]
fn test_restore_single_unit_pulls_only_that_subtree() {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    let snapshot = backed_up(&ctx, &store);

    let runner = MockRunner::new();
    ctx.restore_manager(&runner, &store)
        .restore_target(&request(&snapshot, Some("billing")), &FixedConfirmer("yes".to_string()))
        .unwrap();

    let restores = runner.calls_matching("psql");
    assert_eq!(restores.len(), 1);
    assert!(restores[0].command_line().ends_with("-d billing"));

    let include = store
        .get_calls()
        .into_iter()
        .find_map(|c| match c {
            StoreCall::Restore { include, .. } => Some(include),
            _ => None,
        })
        .unwrap();
    let expected = ctx.staging_dir().join("relational-pg/main/billing");
    assert_eq!(include, vec![expected.display().to_string()]);
}

#[test]
fn test_restore_accepts_short_snapshot_prefix() {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    let snapshot = backed_up(&ctx, &store);

    let runner = MockRunner::new();
    let outcome = ctx
        .restore_manager(&runner, &store)
        .restore_target(&request(&snapshot[..6], Some("app")), &FixedConfirmer("yes".to_string()))
        .unwrap();

    assert!(matches!(outcome, RestoreOutcome::Restored(_)));
}

#[test]
fn test_restore_unknown_unit_fails_before_store_access() {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    let snapshot = backed_up(&ctx, &store);

    let err = ctx
        .restore_manager(&MockRunner::new(), &store)
        .restore_target(&request(&snapshot, Some("payroll")), &NeverAsked)
        .unwrap_err();

    assert!(err.to_string().contains("payroll"));
    assert!(!store.restore_called());
}

#[test]
fn test_restore_missing_artifact_fails_before_prompt() {
    let ctx = TestContext::new();
    ctx.add_target(
        TargetBuilder::postgres("main")
            .container("pg-main")
            .databases(&["app"])
            .build(),
    );
    // Snapshot exists but holds nothing for this target
    let store = MockSnapshotStore::new()
        .with_archive(&ctx.create_subdir("archive"))
        .with_snapshots(vec![sample_snapshot()]);
    fs::create_dir_all(ctx.temp_dir().join("archive").join(&sample_snapshot().id)).unwrap();

    let runner = MockRunner::new();
    let err = ctx
        .restore_manager(&runner, &store)
        .restore_target(&request("abc123de", None), &NeverAsked)
        .unwrap_err();

    assert!(format!("{:#}", err).contains("app.sql.gz"));
    assert!(runner.get_calls().is_empty());
}

#[test]
fn test_restore_unknown_snapshot_fails() {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    backed_up(&ctx, &store);

    let err = ctx
        .restore_manager(&MockRunner::new(), &store)
        .restore_target(&request("ffffffff", None), &NeverAsked)
        .unwrap_err();
    assert!(err.to_string().contains("no snapshot matches"));
}

#[test]
fn test_restore_unknown_target_fails() {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new();

    let mut req = request("abc123de", None);
    req.target = "ghost".to_string();
    let err = ctx
        .restore_manager(&MockRunner::new(), &store)
        .restore_target(&req, &NeverAsked)
        .unwrap_err();

    assert!(format!("{:#}", err).contains("ghost"));
    assert!(store.get_calls().is_empty());
}

#[test]
fn test_failed_engine_restore_is_an_error() {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    let snapshot = backed_up(&ctx, &store);

    let runner = MockRunner::new().expect("psql", MockResponse::fail(3, "ERROR: relation exists"));
    let err = ctx
        .restore_manager(&runner, &store)
        .restore_target(&request(&snapshot, None), &FixedConfirmer("yes".to_string()))
        .unwrap_err();

    assert!(err.to_string().contains("restore failed"));
    // Stops at the first failing unit
    assert_eq!(runner.call_count("psql"), 1);
}

#[test]
fn test_list_sorts_oldest_first() {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new().with_snapshots(sample_snapshots(3));

    let listed = ctx
        .restore_manager(&MockRunner::new(), &store)
        .list()
        .unwrap();

    let times: Vec<&str> = listed.iter().map(|s| s.time.as_str()).collect();
    let mut sorted = times.clone();
    sorted.sort();
    assert_eq!(times, sorted);
    assert_eq!(listed.len(), 3);
}

#[test]
fn test_show_resolves_short_id() {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new().with_snapshots(vec![sample_snapshot()]);

    let (snapshot, paths) = ctx
        .restore_manager(&MockRunner::new(), &store)
        .show("abc123de")
        .unwrap();

    assert_eq!(snapshot.id, sample_snapshot().id);
    assert_eq!(paths, sample_snapshot().paths);
}

#[test]
fn test_files_restores_into_fresh_directory() {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    let snapshot = backed_up(&ctx, &store);

    let dest = ctx.temp_dir().join("extracted");
    let staged = ctx.staging_dir().join("relational-pg/main/app");
    let out = ctx
        .restore_manager(&MockRunner::new(), &store)
        .files(&snapshot, &staged.display().to_string(), Some(dest.clone()))
        .unwrap();

    assert_eq!(out, dest);
    let restored = test_utils::files_under(&dest);
    assert_eq!(restored.len(), 1);
    assert!(restored[0].ends_with("app.sql.gz"));
}

#[test]
fn test_files_refuses_non_empty_directory() {
    let ctx = TestContext::new();
    let store = MockSnapshotStore::new().with_snapshots(vec![sample_snapshot()]);

    let dest = ctx.create_subdir("occupied");
    fs::write(dest.join("keep.txt"), "keep").unwrap();

    let result = ctx
        .restore_manager(&MockRunner::new(), &store)
        .files("abc123de", "/", Some(dest));
    assert!(result.is_err());
    assert!(!store.restore_called());
}
