//! Unit tests for configuration loading
//!
//! Covers explicit config files, parse and validation errors, and the
//! precedence of command-line overrides.

mod common;

use rstest::rstest;
use std::path::PathBuf;
use tempfile::TempDir;

use azsnap::config::{Backend, ConfigManager, Overrides};
use azsnap::errors::{ConfigError, SnapError};

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("azsnap.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_loads_explicit_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[azure]
backend = "rest"
interactive_login = false

[batch]
concurrency = 16

[retry]
max_attempts = 3
base_delay_ms = 250

[snapshot]
name_prefix = "SNAP"
expire_days = 7

[output]
dir = "/var/log/azsnap"
"#,
    );

    let manager = ConfigManager::new(Some(path.clone()), &Overrides::default())
        .await
        .unwrap();
    let config = manager.get_current_config();

    assert_eq!(manager.source(), Some(path.as_path()));
    assert_eq!(config.azure.backend, Backend::Rest);
    assert!(!config.azure.interactive_login);
    assert_eq!(config.batch.concurrency, 16);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_ms, 250);
    assert_eq!(config.retry.max_delay_ms, 30_000);
    assert_eq!(config.snapshot.name_prefix, "SNAP");
    assert_eq!(config.snapshot.expire_days, 7);
    assert_eq!(config.output.dir, PathBuf::from("/var/log/azsnap"));
    assert_eq!(config.output.snapshot_list_file, PathBuf::from("snap_rid_list.txt"));
}

#[tokio::test]
async fn test_command_line_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[batch]\nconcurrency = 16\n");
    let overrides = Overrides {
        backend: Some(Backend::Cli),
        concurrency: Some(2),
        output_dir: Some(PathBuf::from("out")),
        dry_run: true,
        no_login: false,
    };

    let config = ConfigManager::new(Some(path), &overrides)
        .await
        .unwrap()
        .get_current_config();

    assert_eq!(config.batch.concurrency, 2);
    assert_eq!(config.output.dir, PathBuf::from("out"));
    assert!(config.batch.dry_run);
    assert!(config.azure.interactive_login);
}

#[tokio::test]
async fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigManager::new(Some(dir.path().join("nope.toml")), &Overrides::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::LoadFailed { .. }));
}

#[tokio::test]
async fn test_malformed_toml_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[batch\nconcurrency = ");
    let err = ConfigManager::new(Some(path), &Overrides::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}

#[tokio::test]
async fn test_invalid_values_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[retry]\nmax_attempts = 0\n");
    let err = ConfigManager::new(Some(path), &Overrides::default())
        .await
        .err()
        .unwrap();
    match err {
        ConfigError::InvalidValue { field, .. } => assert_eq!(field, "retry.max_attempts"),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_override_can_make_config_invalid() {
    let overrides = Overrides {
        concurrency: Some(0),
        ..Default::default()
    };
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");
    assert!(ConfigManager::new(Some(path), &overrides).await.is_err());
}

#[tokio::test]
async fn test_unknown_backend_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[azure]\nbackend = \"powershell\"\n");
    assert!(ConfigManager::new(Some(path), &Overrides::default()).await.is_err());
}

#[rstest]
#[case("request_timeout_seconds", "azure.request_timeout_seconds")]
#[case("provision_poll_interval_seconds", "azure.provision_poll_interval_seconds")]
#[case("max_provision_polls", "azure.max_provision_polls")]
#[tokio::test]
async fn test_zero_azure_timings_rejected(#[case] key: &str, #[case] expected_field: &str) {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, &format!("[azure]\n{} = 0\n", key));

    let err = ConfigManager::new(Some(path), &Overrides::default())
        .await
        .err()
        .unwrap();

    match err {
        ConfigError::InvalidValue { field, .. } => assert_eq!(field, expected_field),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_config_failure_maps_to_fatal_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[retry]\nmultiplier = 0.5\n");

    let err: SnapError = ConfigManager::new(Some(path), &Overrides::default())
        .await
        .map_err(SnapError::Config)
        .err()
        .unwrap();

    assert!(matches!(err, SnapError::Config(ConfigError::InvalidValue { .. })));
    assert_eq!(
        err.to_string(),
        "Invalid value for 'retry.multiplier': must be a number >= 1.0"
    );
}
