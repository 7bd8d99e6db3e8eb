//! Key-value integration tests
//!
//! Exercises BGSAVE completion polling and the stop/copy/start restore path
//! against a real Redis container.
//! Run with: `cargo test -p stackvault-tests --test integration -- --ignored`

use stackvault::managers::backup::BackupScope;
use stackvault::managers::restore::{FixedConfirmer, RestoreRequest};
use stackvault::registry::{Engine, Mode};
use stackvault::utils::executor::RealRunner;
use std::sync::Arc;
use test_utils::{MockSnapshotStore, TargetBuilder, TestContext};

use super::common::{
    container_name, docker_exec, is_docker_available, run_container, wait_until, ContainerGuard,
};

fn redis_cli(container: &str, args: &[&str]) -> String {
    let mut argv = vec!["redis-cli"];
    argv.extend_from_slice(args);
    docker_exec(container, &argv)
}

#[test]
#[ignore]
fn test_redis_backup_and_restore_in_container() {
    if !is_docker_available() {
        eprintln!("Skipping test: Docker not available");
        return;
    }

    let name = container_name("redis");
    run_container(&name, &["redis:7-alpine"]);
    let container = ContainerGuard::new(name);
    wait_until("Redis", 30, || {
        std::process::Command::new("docker")
            .args(["exec", container.name(), "redis-cli", "ping"])
            .output()
            .map(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).contains("PONG"))
            .unwrap_or(false)
    });

    redis_cli(container.name(), &["SET", "greeting", "hello"]);

    let ctx = TestContext::new();
    ctx.add_target(
        TargetBuilder::new(Engine::KeyValue, "cache", Mode::Container)
            .container(container.name())
            .build(),
    );

    let store = MockSnapshotStore::new().with_archive(&ctx.create_subdir("archive"));
    let runner = Arc::new(RealRunner::new().unwrap());

    let report = ctx
        .backup_manager_with(runner.clone(), &store)
        .run(BackupScope::Engine(Engine::KeyValue), None);
    assert_eq!(report.exit_code(), 0, "{}", report.summary_line());

    redis_cli(container.name(), &["DEL", "greeting"]);

    let request = RestoreRequest {
        engine: Engine::KeyValue,
        snapshot: report.snapshot_id.unwrap(),
        target: "cache".to_string(),
        unit: None,
    };
    ctx.restore_manager_with(runner, &store)
        .restore_target(&request, &FixedConfirmer("yes".to_string()))
        .unwrap();

    wait_until("Redis after restore", 30, || {
        std::process::Command::new("docker")
            .args(["exec", container.name(), "redis-cli", "ping"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    });
    assert_eq!(redis_cli(container.name(), &["GET", "greeting"]), "hello");
}
