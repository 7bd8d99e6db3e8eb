//! Tests for the 'backup' command
//!
//! A backup run dumps every enabled target in scope into the staging tree,
//! ingests the tree as one snapshot, applies retention and cleans up.

use stackvault::managers::backup::BackupScope;
use stackvault::managers::report::RunStatus;
use stackvault::registry::{Engine, Mode};
use stackvault::utils::cancel::CancelFlag;
use stackvault::utils::executor::{CommandOutput, CommandRunner, CommandSpec, RunError};
use std::fs;
use std::path::PathBuf;
use test_utils::{
    files_under, read_gzip, MockResponse, MockRunner, MockSnapshotStore, StoreCall, TargetBuilder,
    TestContext,
};

const DUMP: &str = "CREATE TABLE users (id int);\n";

/// Delegates to a [`MockRunner`] and runs `after` once each command returns
struct AfterEachCall<F> {
    inner: MockRunner,
    after: F,
}

impl<F: Fn() + Send + Sync> CommandRunner for AfterEachCall<F> {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
        let output = self.inner.run(spec);
        (self.after)();
        output
    }

    fn tool_available(&self, tool: &str) -> bool {
        self.inner.tool_available(tool)
    }
}

fn main_target() -> stackvault::registry::Target {
    TargetBuilder::postgres("main")
        .container("pg-main")
        .databases(&["app"])
        .credential("PG_PASSWORD")
        .build()
}

#[test]
fn test_backup_single_target_produces_one_snapshot() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());

    let archive = ctx.create_subdir("archive");
    let runner = MockRunner::new().expect("pg_dump", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new().with_archive(&archive);

    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert_eq!(report.status(), RunStatus::Success, "{}", report.summary_line());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.succeeded, vec!["relational-pg/main/app"]);
    assert!(report.snapshot_id.is_some());

    let dump = &runner.calls_matching("pg_dump")[0];
    assert_eq!(
        dump.command_line(),
        "docker exec -i -e PGPASSWORD pg-main pg_dump -U postgres --clean --if-exists -d app"
    );
    assert!(dump.env_keys.contains(&"PGPASSWORD".to_string()));
    assert!(!dump.command_line().contains("pg-secret"));

    let backups = store.backup_calls();
    assert_eq!(backups.len(), 1);
    match &backups[0] {
        StoreCall::Backup { path, tags, host } => {
            assert_eq!(path, ctx.staging_dir());
            assert_eq!(tags[0], "automated");
            assert!(tags[1].starts_with("date:"));
            assert_eq!(tags[1].len(), "date:YYYY-MM-DD".len());
            assert_eq!(host.as_deref(), Some("test-host"));
        }
        other => panic!("unexpected call: {:?}", other),
    }
    assert!(store.forget_called());

    // Exactly one staged artifact made it into the snapshot
    let ingested = files_under(&archive);
    assert_eq!(ingested.len(), 1);
    assert!(ingested[0].ends_with("app.sql.gz"));
    assert!(ingested[0]
        .to_string_lossy()
        .contains("/relational-pg/main/app/"));
    assert_eq!(read_gzip(&ingested[0]), DUMP.as_bytes());

    // Cleanup removed the staging tree
    assert!(!ctx.staging_dir().exists());
}

#[test]
fn test_backup_dump_failure_reports_target_and_cleans_up() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());

    let runner = MockRunner::new().expect("pg_dump", MockResponse::fail(1, "connection refused"));
    let store = MockSnapshotStore::new();

    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(report.failed_targets(), vec!["relational-pg/main"]);
    assert!(report.summary_line().contains("relational-pg/main"));
    assert!(report.failures[0].error.contains("connection refused"));

    // Nothing was staged, so nothing was ingested
    assert!(store.backup_calls().is_empty());
    assert!(!ctx.staging_dir().exists());
}

#[test]
fn test_backup_continues_after_one_target_fails() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());
    ctx.add_target(
        TargetBuilder::postgres("reports")
            .container("pg-reports")
            .databases(&["reports"])
            .build(),
    );

    let runner = MockRunner::new()
        .expect("pg-main", MockResponse::fail(2, "database \"app\" does not exist"))
        .expect("pg-reports", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new();

    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.succeeded, vec!["relational-pg/reports/reports"]);
    assert_eq!(report.failed_targets(), vec!["relational-pg/main"]);
    assert_eq!(store.backup_calls().len(), 1);
    assert!(store.forget_called());
}

#[test]
fn test_backup_timeout_fails_only_that_target() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());
    ctx.add_target(
        TargetBuilder::postgres("reports")
            .container("pg-reports")
            .databases(&["reports"])
            .build(),
    );

    let runner = MockRunner::new()
        .expect("pg-main", MockResponse::Timeout)
        .expect("pg-reports", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new();

    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(report.failed_targets(), vec!["relational-pg/main"]);
    assert_eq!(store.backup_calls().len(), 1);
}

#[test]
fn test_disabled_target_is_never_invoked() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());
    ctx.registry()
        .set_enabled(Engine::RelationalPg, "main", false)
        .unwrap();

    let runner = MockRunner::new().expect("pg_dump", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new();

    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert!(runner.get_calls().is_empty());
    assert!(report.succeeded.is_empty());
    assert!(report.failures.is_empty());
    assert_eq!(report.exit_code(), 0);
    assert!(store.backup_calls().is_empty());
}

#[test]
fn test_named_disabled_target_is_not_an_error() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());
    ctx.registry()
        .set_enabled(Engine::RelationalPg, "main", false)
        .unwrap();

    let runner = MockRunner::new();
    let report = ctx
        .backup_manager(&runner, &MockSnapshotStore::new())
        .run(BackupScope::All, Some("main"));

    assert_eq!(report.exit_code(), 0);
    assert!(runner.get_calls().is_empty());
}

#[test]
fn test_unknown_target_name_fails_preflight() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());

    let runner = MockRunner::new();
    let store = MockSnapshotStore::new();
    let report = ctx
        .backup_manager(&runner, &store)
        .run(BackupScope::All, Some("nope"));

    assert_eq!(report.status(), RunStatus::Failed);
    assert!(report.run_failure.unwrap().contains("nope"));
    assert!(runner.get_calls().is_empty());
}

#[test]
fn test_target_name_narrows_the_run() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());
    ctx.add_target(
        TargetBuilder::postgres("reports")
            .container("pg-reports")
            .databases(&["reports"])
            .build(),
    );

    let runner = MockRunner::new().with_default_response(MockResponse::ok(DUMP));
    let report = ctx
        .backup_manager(&runner, &MockSnapshotStore::new())
        .run(BackupScope::Engine(Engine::RelationalPg), Some("reports"));

    assert_eq!(report.succeeded, vec!["relational-pg/reports/reports"]);
    assert!(!runner.was_called("pg-main"));
}

#[test]
fn test_unreachable_store_aborts_before_any_target() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());

    let runner = MockRunner::new().expect("pg_dump", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new().unreachable();

    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert_eq!(report.status(), RunStatus::Failed);
    assert!(report.run_failure.is_some());
    assert!(runner.get_calls().is_empty());
    assert!(store.backup_calls().is_empty());
}

#[test]
fn test_missing_store_binary_aborts_run() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());

    let runner = MockRunner::new();
    let store = MockSnapshotStore::new().unavailable();
    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert_eq!(report.status(), RunStatus::Failed);
    assert!(report.run_failure.unwrap().contains("restic"));
    assert!(runner.get_calls().is_empty());
}

#[test]
fn test_first_run_initializes_repository() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());

    let runner = MockRunner::new().expect("pg_dump", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new().uninitialized();

    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert_eq!(report.exit_code(), 0, "{}", report.summary_line());
    assert!(store.init_called());
}

#[test]
fn test_missing_credential_fails_only_that_target() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());
    ctx.add_target(
        TargetBuilder::postgres("other")
            .container("pg-other")
            .databases(&["reports"])
            .credential("UNSET_PASSWORD_VAR")
            .build(),
    );

    let runner = MockRunner::new().expect("pg_dump", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new();
    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert_eq!(report.status(), RunStatus::Partial, "{}", report.summary_line());
    assert!(report.run_failure.is_none());
    assert_eq!(report.succeeded, vec!["relational-pg/main/app"]);
    assert_eq!(report.failed_targets(), vec!["relational-pg/other"]);
    assert!(report.failures[0].error.contains("UNSET_PASSWORD_VAR"));

    // Nothing ran against the target without a credential
    assert_eq!(runner.call_count("pg_dump"), 1);
    assert!(!runner.was_called("pg-other"));
    assert_eq!(store.backup_calls().len(), 1);
    assert!(store.forget_called());
}

#[test]
fn test_snapshot_failure_fails_the_run() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());

    let runner = MockRunner::new().expect("pg_dump", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new().with_failing_backup();

    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(report.exit_code(), 1);
    assert!(!store.forget_called());
    assert!(!ctx.staging_dir().exists());
}

#[test]
fn test_retention_failure_fails_the_run() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());

    let runner = MockRunner::new().expect("pg_dump", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new().with_failing_forget();

    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert_eq!(report.status(), RunStatus::Failed);
    assert!(report.snapshot_id.is_some());
    assert!(report.run_failure.unwrap().starts_with("retention"));
}

#[test]
fn test_retention_uses_configured_policy() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());

    let runner = MockRunner::new().expect("pg_dump", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new();
    ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    let forget = store
        .get_calls()
        .into_iter()
        .find(|c| matches!(c, StoreCall::Forget { .. }))
        .expect("forget was not called");
    assert_eq!(
        forget,
        StoreCall::Forget {
            policy: ctx.config().retention.clone()
        }
    );
}

#[test]
fn test_missing_transport_tool_fails_only_that_target() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());
    ctx.add_target(
        TargetBuilder::postgres("remote")
            .mode(Mode::Network)
            .host("10.0.0.5", 5432)
            .databases(&["app"])
            .build(),
    );

    let runner = MockRunner::new()
        .without_tool("docker")
        .expect("pg_dump", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new();

    let report = ctx.backup_manager(&runner, &store).run(BackupScope::All, None);

    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(report.failed_targets(), vec!["relational-pg/main"]);
    assert_eq!(report.succeeded, vec!["relational-pg/remote/app"]);
    assert!(!runner.was_called("docker"));
    assert_eq!(
        runner.calls_matching("pg_dump")[0].command_line(),
        "pg_dump -h 10.0.0.5 -p 5432 -U postgres --clean --if-exists -d app"
    );
}

#[test]
fn test_volumes_scope_skips_databases() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());

    let runner = MockRunner::new();
    let store = MockSnapshotStore::new();
    let report = ctx
        .backup_manager(&runner, &store)
        .run(BackupScope::Volumes, None);

    assert_eq!(report.exit_code(), 0);
    assert!(!runner.was_called("pg_dump"));
}

#[test]
fn test_unsupported_combination_fails_target_without_running_anything() {
    let ctx = TestContext::new();
    ctx.add_target(
        TargetBuilder::new(Engine::KeyValue, "cache", Mode::Network)
            .host("redis.internal", 6379)
            .build(),
    );

    let runner = MockRunner::new();
    let report = ctx
        .backup_manager(&runner, &MockSnapshotStore::new())
        .run(BackupScope::All, None);

    assert_eq!(report.failed_targets(), vec!["key-value/cache"]);
    assert!(report.failures[0].error.contains("network"));
    assert!(runner.get_calls().is_empty());
}

#[test]
fn test_cancelled_run_skips_snapshot_and_cleans_up() {
    let ctx = TestContext::new();
    ctx.add_target(main_target());

    let cancel = CancelFlag::new();
    cancel.cancel();

    let runner = MockRunner::new().expect("pg_dump", MockResponse::ok(DUMP));
    let store = MockSnapshotStore::new();
    let report = ctx
        .backup_manager(&runner, &store)
        .with_cancel_flag(cancel)
        .run(BackupScope::All, None);

    assert!(report.cancelled);
    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(report.exit_code(), 1);
    assert!(runner.get_calls().is_empty());
    assert!(store.backup_calls().is_empty());
    assert!(!ctx.staging_dir().exists());
}

#[test]
fn test_run_log_path_is_carried_in_report() {
    let ctx = TestContext::new();
    let log = ctx.temp_dir().join("logs/backup-20250101T000000Z.log");

    let report = ctx
        .backup_manager(&MockRunner::new(), &MockSnapshotStore::new())
        .with_log_path(log.clone())
        .run(BackupScope::All, None);

    assert_eq!(report.log_path, Some(log));
}

#[test]
fn test_cancel_between_units_stops_the_target() {
    let ctx = TestContext::new();
    ctx.add_target(
        TargetBuilder::postgres("main")
            .container("pg-main")
            .databases(&["app", "billing"])
            .credential("PG_PASSWORD")
            .build(),
    );

    let cancel = CancelFlag::new();
    let mock = MockRunner::new().expect("pg_dump", MockResponse::ok(DUMP));
    let flag = cancel.clone();
    let runner = AfterEachCall {
        inner: mock.clone(),
        after: move || flag.cancel(),
    };
    let store = MockSnapshotStore::new();

    let report = ctx
        .backup_manager_with(std::sync::Arc::new(runner), &store)
        .with_cancel_flag(cancel)
        .run(BackupScope::All, None);

    assert!(report.cancelled);
    assert_eq!(report.succeeded, vec!["relational-pg/main/app"]);
    assert!(report.failures.is_empty());
    assert_eq!(mock.call_count("pg_dump"), 1);
    assert!(!mock.was_called("-d billing"));
    assert!(store.backup_calls().is_empty());
}

#[test]
fn test_unit_staging_directory_failure_fails_only_that_unit() {
    let ctx = TestContext::new();
    ctx.add_target(
        TargetBuilder::postgres("main")
            .container("pg-main")
            .databases(&["app", "billing"])
            .credential("PG_PASSWORD")
            .build(),
    );
    ctx.add_target(
        TargetBuilder::postgres("reports")
            .container("pg-reports")
            .databases(&["reports"])
            .build(),
    );

    // A plain file where billing's unit directory belongs
    let blocker: PathBuf = ctx.staging_dir().join("relational-pg/main/billing");
    let mock = MockRunner::new().expect("pg_dump", MockResponse::ok(DUMP));
    let runner = AfterEachCall {
        inner: mock.clone(),
        after: move || {
            if !blocker.exists() {
                fs::write(&blocker, "in the way").unwrap();
            }
        },
    };
    let store = MockSnapshotStore::new();

    let report = ctx
        .backup_manager_with(std::sync::Arc::new(runner), &store)
        .run(BackupScope::All, None);

    assert!(report.run_failure.is_none(), "{}", report.summary_line());
    assert_eq!(
        report.succeeded,
        vec!["relational-pg/main/app", "relational-pg/reports/reports"]
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].unit.as_deref(), Some("billing"));
    assert!(report.failures[0].error.contains("staging directory"));
    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(store.backup_calls().len(), 1);
}
