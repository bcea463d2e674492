//! Unit tests for configuration loading and graceful degradation
//!
//! Covers:
//! - Missing TOML at the default location falls back to compiled defaults
//! - An explicitly named TOML file must exist and parse
//! - Round trip through write_toml_config / load_toml_config
//!
//! Tests that manipulate XDG_CONFIG_HOME are marked with #[serial].

use apm_common::config::{
    default_config_path, load_or_default, load_toml_config, write_toml_config, TomlConfig,
};
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_explicit_config_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("apm-session.toml");
    fs::write(
        &path,
        r#"
port = 6100
classifier_urls = ["http://10.0.0.5:5000", "http://10.0.0.6:5000"]
doctor_id = "dr-42"

[fusion]
eeg_weight = 0.6
biometric_weight = 0.4

[timing]
analyzing_ms = 250

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = load_or_default(Some(&path), "apm-session").unwrap();
    assert_eq!(config.port, Some(6100));
    assert_eq!(config.classifier_urls.len(), 2);
    assert_eq!(config.classifier_urls[0], "http://10.0.0.5:5000");
    assert_eq!(config.doctor_id.as_deref(), Some("dr-42"));
    assert_eq!(config.fusion.eeg_weight, Some(0.6));
    assert_eq!(config.fusion.conflict_gap_threshold, None);
    assert_eq!(config.timing.analyzing_ms, Some(250));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_explicit_missing_config_file_is_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("does-not-exist.toml");
    assert!(load_or_default(Some(&path), "apm-session").is_err());
}

#[test]
fn test_malformed_config_file_is_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "port = \"not a number\"").unwrap();
    assert!(load_toml_config(&path).is_err());
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_missing_default_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    env::set_var("XDG_CONFIG_HOME", dir.path());

    let config = load_or_default(None, "apm-missing-module").unwrap();
    assert!(config.port.is_none());
    assert!(config.classifier_urls.is_empty());
    assert_eq!(config.logging.level, "info");

    env::remove_var("XDG_CONFIG_HOME");
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_default_config_location_is_used_when_present() {
    let dir = TempDir::new().unwrap();
    env::set_var("XDG_CONFIG_HOME", dir.path());

    let path = default_config_path("apm-session").unwrap();
    assert!(path.starts_with(dir.path()));

    let config = TomlConfig {
        port: Some(7001),
        store_url: Some("http://store:5000".to_string()),
        ..Default::default()
    };
    write_toml_config(&config, &path).unwrap();

    let loaded = load_or_default(None, "apm-session").unwrap();
    assert_eq!(loaded.port, Some(7001));
    assert_eq!(loaded.store_url.as_deref(), Some("http://store:5000"));

    env::remove_var("XDG_CONFIG_HOME");
}
