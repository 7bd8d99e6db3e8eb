//! Common utilities for integration tests

use std::process::Command;
use std::thread;
use std::time::Duration;

/// Guard that ensures Docker container cleanup on drop (even on panic)
pub struct ContainerGuard {
    name: String,
}

impl ContainerGuard {
    pub fn new(name: String) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        cleanup_container(&self.name);
    }
}

/// Stop and remove a container along with its anonymous volumes
fn cleanup_container(name: &str) {
    let _ = Command::new("docker").args(["stop", name]).output();
    let _ = Command::new("docker").args(["rm", "-v", name]).output();
}

pub fn is_docker_available() -> bool {
    Command::new("docker")
        .args(["ps"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn tool_exists(tool: &str) -> bool {
    Command::new("which")
        .arg(tool)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Unique container name for a test
pub fn container_name(prefix: &str) -> String {
    format!("stackvault-test-{}-{}", prefix, std::process::id())
}

/// Start a detached container, failing the test if docker refuses
pub fn run_container(name: &str, args: &[&str]) {
    let output = Command::new("docker")
        .args(["run", "-d", "--name", name])
        .args(args)
        .output()
        .expect("Failed to run docker");
    assert!(
        output.status.success(),
        "docker run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Run a command inside a container and return its stdout
pub fn docker_exec(container: &str, args: &[&str]) -> String {
    let output = Command::new("docker")
        .args(["exec", container])
        .args(args)
        .output()
        .expect("Failed to run docker exec");
    assert!(
        output.status.success(),
        "docker exec failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Retry `check` once a second until it succeeds
pub fn wait_until(what: &str, attempts: u32, check: impl Fn() -> bool) {
    for _ in 0..attempts {
        if check() {
            return;
        }
        thread::sleep(Duration::from_secs(1));
    }
    panic!("{} did not become ready", what);
}
