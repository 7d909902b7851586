use sysdash::core::config::MonitorConfig;
use tempfile::TempDir;

#[test]
fn test_config_missing_file_returns_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = MonitorConfig::load_from(&temp_dir.path().join("absent.json")).unwrap();
    assert_eq!(config, MonitorConfig::default());
}

#[test]
fn test_config_empty_file_returns_default() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, "  \n").unwrap();

    let config = MonitorConfig::load_from(&path).unwrap();
    assert_eq!(config, MonitorConfig::default());
}

#[test]
fn test_config_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.json");

    let config = MonitorConfig {
        max_processes: 50,
        system_interval_ms: 750,
        join_replaced: true,
        ..Default::default()
    };
    config.save_to(&path).unwrap();

    let loaded = MonitorConfig::load_from(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_config_zero_cap_rejected_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, r#"{"max_connections": 0}"#).unwrap();

    let err = MonitorConfig::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("max_connections"));
}

#[test]
fn test_config_malformed_json_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(MonitorConfig::load_from(&path).is_err());
}

#[test]
fn test_config_invalid_not_saved() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    let config = MonitorConfig {
        process_cache_ms: 0,
        ..Default::default()
    };

    assert!(config.save_to(&path).is_err());
    assert!(!path.exists());
}
