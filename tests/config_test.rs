//! Integration tests for settings and source loading

use serial_test::serial;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use sentinel::config::{load_sources, Settings};
use sentinel::models::{Method, ResponseFormat};
use sentinel::registry::Registry;

const OVERRIDE_VARS: &[&str] = &[
    "SENTINEL_STATE_PATH",
    "SENTINEL_LOG_LEVEL",
    "SENTINEL_HTTP_TIMEOUT",
    "SENTINEL_MAX_RETRIES",
];

fn clear_overrides() {
    for var in OVERRIDE_VARS {
        std::env::remove_var(var);
    }
}

fn bundled(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join(name)
}

#[test]
fn test_bundled_settings_are_valid() {
    let settings = Settings::from_file(&bundled("settings.yaml")).unwrap();
    settings.validate().unwrap();
    assert_eq!(settings.http.max_retries, 3);
    assert_eq!(settings.state.path, PathBuf::from("state/last_checked.json"));
}

#[test]
fn test_bundled_sources_load_in_order() {
    let sources = load_sources(&bundled("sources.yaml")).unwrap();

    assert!(!sources.is_empty());
    assert!(sources.iter().all(|s| s.resolved_method().is_some()));
    assert_eq!(sources[0].resolved_method(), Some(Method::HttpHead));
    assert!(sources
        .iter()
        .any(|s| s.response_format == ResponseFormat::Xml));

    let registry = Registry::new(sources, Settings::default()).unwrap();
    for source in registry.sources() {
        assert!(registry.create_handler(source).is_ok(), "{}", source.id);
    }
}

#[test]
fn test_missing_settings_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_or_default(&dir.path().join("absent.yaml")).unwrap();
    assert_eq!(settings.http.timeout, 30);
}

#[test]
fn test_invalid_settings_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.yaml");
    std::fs::write(&path, "logging:\n  format: xml\n").unwrap();

    let settings = Settings::from_file(&path).unwrap();
    assert!(settings.validate().is_err());

    std::fs::write(&path, "http: fast\n").unwrap();
    assert!(Settings::from_file(&path).is_err());
}

#[test]
fn test_missing_sources_file_is_error() {
    let dir = TempDir::new().unwrap();
    let err = load_sources(&dir.path().join("sources.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read sources file"));
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_overrides();
    std::env::set_var("SENTINEL_STATE_PATH", "/tmp/sentinel-state.json");
    std::env::set_var("SENTINEL_LOG_LEVEL", "debug");
    std::env::set_var("SENTINEL_HTTP_TIMEOUT", "7");
    std::env::set_var("SENTINEL_MAX_RETRIES", "5");

    let settings = Settings::default().with_env_overrides();
    clear_overrides();

    assert_eq!(settings.state.path, PathBuf::from("/tmp/sentinel-state.json"));
    assert_eq!(settings.logging.level, "debug");
    assert_eq!(settings.http.timeout, 7);
    assert_eq!(settings.http.max_retries, 5);
    assert_eq!(settings.retry_config().max_attempts, 5);
}

#[test]
#[serial]
fn test_unparseable_env_values_are_ignored() {
    clear_overrides();
    std::env::set_var("SENTINEL_HTTP_TIMEOUT", "soon");

    let settings = Settings::default().with_env_overrides();
    clear_overrides();

    assert_eq!(settings.http.timeout, 30);
}
