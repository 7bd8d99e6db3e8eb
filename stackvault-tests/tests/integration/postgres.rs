//! PostgreSQL integration tests
//!
//! These tests require Docker and run pg_dump/psql inside a real container.
//! Run with: `cargo test -p stackvault-tests --test integration -- --ignored`

use stackvault::managers::backup::BackupScope;
use stackvault::managers::restore::{FixedConfirmer, RestoreOutcome, RestoreRequest};
use stackvault::registry::Engine;
use stackvault::utils::executor::RealRunner;
use std::sync::Arc;
use test_utils::{MockSnapshotStore, TargetBuilder, TestContext};

use super::common::{
    container_name, docker_exec, is_docker_available, run_container, wait_until, ContainerGuard,
};

fn start_postgres(name: &str) -> ContainerGuard {
    run_container(
        name,
        &[
            "-e",
            "POSTGRES_PASSWORD=testpass",
            "-e",
            "POSTGRES_DB=testdb",
            "postgres:15-alpine",
        ],
    );
    let guard = ContainerGuard::new(name.to_string());
    wait_until("PostgreSQL", 60, || {
        std::process::Command::new("docker")
            .args(["exec", name, "pg_isready", "-U", "postgres", "-d", "testdb"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    });
    guard
}

fn sql(container: &str, statement: &str) -> String {
    docker_exec(
        container,
        &["psql", "-U", "postgres", "-d", "testdb", "-t", "-A", "-c", statement],
    )
}

/// Back up `testdb`, empty the table it holds, restore into the live database
fn round_trip(prefix: &str, custom_format: bool) {
    let name = container_name(prefix);
    let container = start_postgres(&name);
    sql(container.name(), "CREATE TABLE users (id int, name text)");
    sql(container.name(), "INSERT INTO users VALUES (1, 'alice'), (2, 'bob')");

    let ctx = TestContext::new().with_secret("PG_PASSWORD", "testpass");
    let mut target = TargetBuilder::postgres("main")
        .container(container.name())
        .databases(&["testdb"])
        .credential("PG_PASSWORD");
    if custom_format {
        target = target.custom_format();
    }
    ctx.add_target(target.build());

    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    let runner = Arc::new(RealRunner::new().unwrap());

    let report = ctx
        .backup_manager_with(runner.clone(), &store)
        .run(BackupScope::Databases, None);
    assert_eq!(report.exit_code(), 0, "{}", report.summary_line());

    // The table still exists when the dump is replayed
    sql(container.name(), "DELETE FROM users");
    sql(container.name(), "INSERT INTO users VALUES (3, 'mallory')");

    let request = RestoreRequest {
        engine: Engine::RelationalPg,
        snapshot: report.snapshot_id.unwrap(),
        target: "main".to_string(),
        unit: None,
    };
    let outcome = ctx
        .restore_manager_with(runner, &store)
        .restore_target(&request, &FixedConfirmer("yes".to_string()))
        .unwrap();
    assert!(matches!(outcome, RestoreOutcome::Restored(_)));

    assert_eq!(
        sql(container.name(), "SELECT string_agg(name, ',' ORDER BY id) FROM users"),
        "alice,bob"
    );
}

#[test]
#[ignore]
fn test_postgres_plain_format_restores_over_existing_tables() {
    if !is_docker_available() {
        eprintln!("Skipping test: Docker not available");
        return;
    }
    round_trip("pg-plain", false);
}

#[test]
#[ignore]
fn test_postgres_custom_format_backup_and_restore() {
    if !is_docker_available() {
        eprintln!("Skipping test: Docker not available");
        return;
    }
    round_trip("pg-custom", true);
}
