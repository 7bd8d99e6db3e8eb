//! Unit tests for the staging tree and artifact lookup

use stackvault::error::BackupError;
use stackvault::registry::Engine;
use stackvault::utils::staging::{locate_artifact, StagingArea};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_prepare_discards_leftovers() {
    let dir = TempDir::new().unwrap();
    let staging = StagingArea::new(dir.path().join("staging"));

    let stale = staging.unit_dir(Engine::Volume, "uploads", "data", "20240101T000000Z");
    fs::create_dir_all(&stale).unwrap();
    fs::write(stale.join("data.tar.gz"), b"old").unwrap();
    assert!(staging.has_artifacts());

    staging.prepare().unwrap();
    assert!(staging.root().is_dir());
    assert!(!staging.has_artifacts());
}

#[test]
fn test_partial_files_do_not_count_as_artifacts() {
    let dir = TempDir::new().unwrap();
    let staging = StagingArea::new(dir.path().join("staging"));
    staging.prepare().unwrap();

    let unit = staging.unit_dir(Engine::RelationalPg, "main", "app", "20240101T000000Z");
    fs::create_dir_all(&unit).unwrap();
    fs::write(unit.join("app.sql.gz.partial"), b"half").unwrap();

    assert!(!staging.has_artifacts());
}

#[test]
fn test_locate_artifact_in_restored_tree() {
    let dir = TempDir::new().unwrap();
    let staging = StagingArea::new("/var/lib/stackvault/staging");
    let restored = dir.path().join("restored");

    let staged = restored
        .join("var/lib/stackvault/staging/relational-pg/main/app/20240301T020000Z");
    fs::create_dir_all(&staged).unwrap();
    fs::write(staged.join("app.sql.gz"), b"dump").unwrap();

    let found = locate_artifact(&restored, &staging, Engine::RelationalPg, "main", "app", "app.sql.gz")
        .unwrap();
    assert_eq!(found, staged.join("app.sql.gz"));
}

#[test]
fn test_locate_artifact_reports_missing_unit() {
    let dir = TempDir::new().unwrap();
    let staging = StagingArea::new("/var/lib/stackvault/staging");

    let err = locate_artifact(dir.path(), &staging, Engine::RelationalPg, "main", "billing", "billing.sql.gz")
        .unwrap_err();
    match err {
        BackupError::ArtifactNotFound { target, artifact, .. } => {
            assert_eq!(target, "relational-pg/main");
            assert_eq!(artifact, "billing.sql.gz");
        }
        other => panic!("unexpected error: {}", other),
    }
}
