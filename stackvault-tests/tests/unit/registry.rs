//! Unit tests for the target registry
//!
//! These tests verify persistence, validation and the management verbs.

use stackvault::registry::{Engine, Mode, RegistryError};
use std::fs;
use test_utils::{postgres_registry_toml, TargetBuilder, TestContext};

#[test]
fn test_registry_loads_enabled_and_disabled_targets() {
    let ctx = TestContext::new();
    let registry = ctx.registry();
    fs::write(registry.file_path(Engine::RelationalPg), postgres_registry_toml()).unwrap();

    let all = registry.load(Engine::RelationalPg).unwrap();
    assert_eq!(all.len(), 2);

    let enabled = registry.list_targets(Engine::RelationalPg).unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].name, "main");
    assert_eq!(enabled[0].logical_units(), vec!["app"]);

    let legacy = registry.find(Engine::RelationalPg, "legacy").unwrap();
    assert!(!legacy.enabled);
    assert_eq!(legacy.mode, Mode::Network);
}

#[test]
fn test_missing_registry_file_means_no_targets() {
    let ctx = TestContext::new();
    assert!(ctx.registry().load(Engine::Vector).unwrap().is_empty());
}

#[test]
fn test_duplicate_add_leaves_file_unchanged() {
    let ctx = TestContext::new();
    let registry = ctx.registry();
    let target = TargetBuilder::postgres("main")
        .container("pg-main")
        .databases(&["app"])
        .build();

    registry.add_target(target.clone()).unwrap();
    let before = fs::read(registry.file_path(Engine::RelationalPg)).unwrap();

    let err = registry.add_target(target).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateTarget { .. }));

    let after = fs::read(registry.file_path(Engine::RelationalPg)).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_same_name_allowed_for_different_engines() {
    let ctx = TestContext::new();
    let registry = ctx.registry();

    registry
        .add_target(TargetBuilder::postgres("main").container("pg").databases(&["app"]).build())
        .unwrap();
    registry
        .add_target(TargetBuilder::mysql("main").container("my").databases(&["app"]).build())
        .unwrap();

    assert_eq!(registry.load(Engine::RelationalPg).unwrap().len(), 1);
    assert_eq!(registry.load(Engine::RelationalMysql).unwrap().len(), 1);
}

#[test]
fn test_add_rejects_missing_connection_parameters() {
    let ctx = TestContext::new();
    let registry = ctx.registry();

    // Container mode without a container name
    let target = TargetBuilder::postgres("main").databases(&["app"]).build();
    let err = registry.add_target(target).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidModeConfiguration { .. }));
    assert!(!registry.file_path(Engine::RelationalPg).exists());
}

#[test]
fn test_enable_disable_and_remove() {
    let ctx = TestContext::new();
    let registry = ctx.registry();
    ctx.add_target(TargetBuilder::postgres("main").container("pg").databases(&["app"]).build());

    registry.set_enabled(Engine::RelationalPg, "main", false).unwrap();
    assert!(registry.list_targets(Engine::RelationalPg).unwrap().is_empty());

    registry.set_enabled(Engine::RelationalPg, "main", true).unwrap();
    assert_eq!(registry.list_targets(Engine::RelationalPg).unwrap().len(), 1);

    let removed = registry.remove_target(Engine::RelationalPg, "main").unwrap();
    assert_eq!(removed.name, "main");
    assert!(registry.load(Engine::RelationalPg).unwrap().is_empty());

    let err = registry.remove_target(Engine::RelationalPg, "main").unwrap_err();
    assert!(matches!(err, RegistryError::TargetNotFound { .. }));
}

#[test]
fn test_registry_rejects_target_filed_under_wrong_engine() {
    let ctx = TestContext::new();
    let registry = ctx.registry();
    fs::write(registry.file_path(Engine::RelationalMysql), postgres_registry_toml()).unwrap();

    assert!(registry.load(Engine::RelationalMysql).is_err());
}

#[test]
fn test_persisted_file_round_trips_options() {
    let ctx = TestContext::new();
    let registry = ctx.registry();
    let target = TargetBuilder::new(Engine::Vector, "embeddings", Mode::Network)
        .host("qdrant.internal", 6333)
        .collections(&["docs", "faq"])
        .credential("QDRANT_API_KEY")
        .build();
    registry.add_target(target.clone()).unwrap();

    let contents = fs::read_to_string(registry.file_path(Engine::Vector)).unwrap();
    assert!(contents.contains("[[targets]]"));
    assert!(contents.contains("credential_env = \"QDRANT_API_KEY\""));
    assert!(!contents.contains("custom_format"));

    assert_eq!(registry.find(Engine::Vector, "embeddings").unwrap(), target);
}
