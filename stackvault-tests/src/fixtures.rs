//! Test fixtures and sample data

use flate2::read::GzDecoder;
use stackvault::utils::restic::Snapshot;
use std::io::Read;
use std::path::Path;

/// Create a sample snapshot for testing
pub fn sample_snapshot() -> Snapshot {
    Snapshot {
        id: "abc123def456789012345678901234567890abcd".to_string(),
        short_id: "abc123de".to_string(),
        time: "2025-12-28T10:30:00.000000000Z".to_string(),
        hostname: "test-host".to_string(),
        tags: vec!["automated".to_string(), "date:2025-12-28".to_string()],
        paths: vec!["/var/lib/stackvault/staging".to_string()],
    }
}

/// Create multiple sample snapshots, newest first
pub fn sample_snapshots(count: usize) -> Vec<Snapshot> {
    (0..count)
        .map(|i| Snapshot {
            id: format!("snapshot{:032}", i),
            short_id: format!("snap{:04}", i),
            time: format!("2025-12-{:02}T10:30:00.000000000Z", 28 - (i % 28)),
            hostname: "test-host".to_string(),
            tags: vec!["automated".to_string()],
            paths: vec!["/var/lib/stackvault/staging".to_string()],
        })
        .collect()
}

/// Minimal valid config, with every path under `root`
pub fn minimal_config_toml(root: &Path) -> String {
    format!(
        r#"
[store]
repository = "{root}/repo"
password_env = "STACKVAULT_TEST_PASSWORD"

[paths]
registry_dir = "{root}/targets"
staging_dir = "{root}/staging"
scratch_dir = "{root}/scratch"
lock_dir = "{root}/locks"

[logging]
log_directory = "{root}/logs"
"#,
        root = root.display()
    )
}

/// A registry file with one enabled and one disabled relational-pg target
pub fn postgres_registry_toml() -> &'static str {
    r#"
[[targets]]
name = "main"
engine = "relational-pg"
mode = "container"
container = "pg-main"
user = "postgres"
credential_env = "PG_PASSWORD"

[targets.options]
databases = ["app"]

[[targets]]
name = "legacy"
engine = "relational-pg"
mode = "network"
enabled = false
host = "10.0.0.5"
port = 5432

[targets.options]
databases = ["old"]
"#
}

/// Decompressed contents of a gzip file
pub fn read_gzip(path: &Path) -> Vec<u8> {
    let file = std::fs::File::open(path).expect("Failed to open gzip file");
    let mut data = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut data)
        .expect("Failed to decompress");
    data
}

/// Every regular file under `dir`, sorted
pub fn files_under(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                files.extend(files_under(&path));
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}
