// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Configuration Integration Tests
//!
//! Integration tests for neasmart-config functionality including:
//!
//! - Loading files in every supported format
//! - Environment placeholders and overrides
//! - Mapping into store and manager configuration
//!
//! ## Test Categories
//!
//! - `test_load_*`: File loading tests
//! - `test_env_*`: Environment tests
//! - `test_mapping_*`: Configuration mapping tests

use std::collections::HashMap;
use std::time::Duration;

use neasmart_config::{
    ConfigError, ConfigFormat, ConfigLoader, DEFAULT_API_PORT, DEFAULT_SYNC_COUNT, LogFormat,
    LogLevel, NeasmartConfig,
};
use neasmart_modbus::BusKind;

use neasmart_tests::common::temp_test_dir;

const GATEWAY_YAML: &str = r#"
gateway:
  slave_id: 240
  sync_on_startup: true
  sync_range:
    start: 100
    count: 64
modbus:
  kind: rtu
  rtu:
    port: /dev/ttyUSB1
    baud_rate: 19200
server:
  port: 5020
store:
  database_path: ${REGISTER_DIR:/var/lib/neasmart}/registers.db
  enable_fallback: true
  retry_max_attempts: 5
circuit_breaker:
  failure_threshold: 4
  recovery_timeout_seconds: 45
logging:
  level: warn
"#;

fn env(vars: &[(&str, &str)]) -> HashMap<String, String> {
    vars.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn loader() -> ConfigLoader {
    ConfigLoader::new().with_env(HashMap::new())
}

// =============================================================================
// Loading Tests
// =============================================================================

#[test]
fn test_load_yaml_file() {
    let dir = temp_test_dir("neasmart_config");
    let path = dir.path().join("neasmart.yaml");
    std::fs::write(&path, GATEWAY_YAML).unwrap();

    let config = loader().load(&path).unwrap();

    assert_eq!(config.gateway.slave_id.get(), 240);
    assert_eq!(config.gateway.sync_range.start, 100);
    assert_eq!(config.modbus.kind, BusKind::Rtu);
    assert_eq!(config.modbus.rtu.port, "/dev/ttyUSB1");
    assert_eq!(config.modbus.rtu.baud_rate, 19_200);
    assert_eq!(
        config.store.database_path.to_str(),
        Some("/var/lib/neasmart/registers.db")
    );
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert_eq!(config.api.port, DEFAULT_API_PORT);
}

#[test]
fn test_load_same_config_in_every_format() {
    let toml = r#"
[gateway]
slave_id = 17

[api]
port = 8080
"#;
    let json = r#"{ "gateway": { "slave_id": 17 }, "api": { "port": 8080 } }"#;
    let yaml = "gateway:\n  slave_id: 17\napi:\n  port: 8080\n";

    let configs = [
        loader().load_from_str(toml, ConfigFormat::Toml).unwrap(),
        loader().load_from_str(json, ConfigFormat::Json).unwrap(),
        loader().load_from_str(yaml, ConfigFormat::Yaml).unwrap(),
    ];
    for config in &configs {
        assert_eq!(config.gateway.slave_id.get(), 17);
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.gateway.sync_range.count, DEFAULT_SYNC_COUNT);
    }
    assert_eq!(configs[0], configs[1]);
    assert_eq!(configs[1], configs[2]);
}

#[test]
fn test_load_rejects_invalid_files() {
    let dir = temp_test_dir("neasmart_config");

    let missing = dir.path().join("missing.yaml");
    assert!(matches!(
        loader().load(&missing),
        Err(ConfigError::FileNotFound { .. })
    ));

    let unsupported = dir.path().join("neasmart.ini");
    std::fs::write(&unsupported, "slave_id=1").unwrap();
    assert!(matches!(
        loader().load(&unsupported),
        Err(ConfigError::UnsupportedFormat { .. })
    ));

    let port_clash = r#"{ "server": { "port": 5001 }, "api": { "port": 5001 } }"#;
    assert!(loader()
        .load_from_str(port_clash, ConfigFormat::Json)
        .is_err());

    let empty_sync = r#"{ "gateway": { "sync_range": { "start": 65535, "count": 2 } } }"#;
    assert!(loader()
        .load_from_str(empty_sync, ConfigFormat::Json)
        .is_err());
}

// =============================================================================
// Environment Tests
// =============================================================================

#[test]
fn test_env_placeholder_and_override_precedence() {
    let loader = ConfigLoader::new().with_env(env(&[
        ("REGISTER_DIR", "/data"),
        ("NEASMART_DATABASE_PATH", "/override/registers.db"),
        ("NEASMART_SLAVE_ID", "12"),
        ("NEASMART_LOG_FORMAT", "json"),
    ]));

    let config = loader
        .load_from_str(GATEWAY_YAML, ConfigFormat::Yaml)
        .unwrap();

    // Overrides beat values resolved from placeholders.
    assert_eq!(
        config.store.database_path.to_str(),
        Some("/override/registers.db")
    );
    assert_eq!(config.gateway.slave_id.get(), 12);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_env_overrides_can_be_disabled() {
    let loader = ConfigLoader::new()
        .with_env(env(&[("NEASMART_SLAVE_ID", "12")]))
        .with_env_vars(false);

    let config = loader
        .load_from_str(GATEWAY_YAML, ConfigFormat::Yaml)
        .unwrap();
    assert_eq!(config.gateway.slave_id.get(), 240);
}

#[test]
fn test_env_custom_prefix() {
    let loader = ConfigLoader::new()
        .with_env_prefix("GW")
        .with_env(env(&[("GW_API_PORT", "9100"), ("NEASMART_API_PORT", "9200")]));

    let config = loader.load_or_default(None).unwrap();
    assert_eq!(config.api.port, 9100);
}

// =============================================================================
// Mapping Tests
// =============================================================================

#[test]
fn test_mapping_into_core_configuration() {
    let config = loader()
        .load_from_str(GATEWAY_YAML, ConfigFormat::Yaml)
        .unwrap();

    let store = config.store_config();
    assert_eq!(store.retry.max_attempts, 5);
    assert!(store.enable_fallback);

    let manager = config.manager_config();
    assert_eq!(manager.slave_id.get(), 240);
    assert_eq!(manager.circuit_breaker.failure_threshold, 4);
    assert_eq!(
        manager.circuit_breaker.recovery_timeout,
        Duration::from_secs(45)
    );

    let range = config.gateway.sync_range.to_range().unwrap();
    assert_eq!(range.len(), 64);

    let core = config.core_settings();
    assert_eq!(core.circuit_breaker_recovery_timeout_seconds, 45);
    assert!(core.sync_on_startup);
}

#[test]
fn test_mapping_default_is_valid() {
    let config = NeasmartConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.gateway.slave_id.get(), 240);
    assert_eq!(config.modbus.kind, BusKind::Local);
}
