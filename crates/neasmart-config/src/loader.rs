// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders in the raw text
//! 3. Parse YAML, TOML or JSON into [`NeasmartConfig`]
//! 4. Apply `NEASMART_*` environment overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! NEASMART_SLAVE_ID=241
//! NEASMART_MODBUS_KIND=tcp
//! NEASMART_MODBUS_HOST=192.168.1.50
//! NEASMART_API_BIND=127.0.0.1:8080
//! NEASMART_LOG_LEVEL=debug
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use neasmart_core::types::SlaveId;
use neasmart_modbus::BusKind;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{LogFormat, LogLevel, NeasmartConfig};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "NEASMART";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader.
///
/// # Examples
///
/// ```no_run
/// use neasmart_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new().load("neasmart.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: String,
    resolve_env_vars: bool,
    /// Replaces the process environment when set.
    env: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    /// Creates a loader reading the process environment.
    pub fn new() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
            env: None,
        }
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables placeholders and overrides.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Reads variables from `vars` instead of the process environment.
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Some(vars);
        self
    }

    /// Loads configuration from a file.
    ///
    /// The file format is determined by the file extension:
    /// - `.yaml` or `.yml` - YAML format
    /// - `.toml` - TOML format
    /// - `.json` - JSON format
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<NeasmartConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let format = ConfigFormat::from_path(path)?;
        let content = read_file(path)?;

        let config = self.process(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        debug!(
            slave_id = %config.gateway.slave_id,
            bus = %config.modbus.kind,
            database = %config.store.database_path.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<NeasmartConfig> {
        self.process(content, format)
    }

    /// Loads the file if given, otherwise starts from defaults. Overrides and
    /// validation apply either way.
    pub fn load_or_default(&self, path: Option<&Path>) -> ConfigResult<NeasmartConfig> {
        match path {
            Some(path) => self.load(path),
            None => {
                let mut config = NeasmartConfig::default();
                if self.resolve_env_vars {
                    self.apply_env_overrides(&mut config)?;
                }
                config.validate()?;
                Ok(config)
            }
        }
    }

    fn process(&self, content: &str, format: ConfigFormat) -> ConfigResult<NeasmartConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)
        } else {
            content.to_string()
        };

        let mut config: NeasmartConfig = parse_str(&content, format)?;
        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(vars) => vars.get(name).cloned(),
            None => env::var(name).ok(),
        }
    }

    fn prefixed(&self, name: &str) -> (String, Option<String>) {
        let key = format!("{}_{}", self.env_prefix, name);
        let value = self.var(&key);
        (key, value)
    }

    /// Resolves `${VAR_NAME}` and `${VAR_NAME:default}` placeholders.
    ///
    /// Unknown variables without a default are left in place.
    fn resolve_env_placeholders(&self, content: &str) -> String {
        let mut result = String::with_capacity(content.len());
        let mut chars = content.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || chars.peek() != Some(&'{') {
                result.push(c);
                continue;
            }
            chars.next();

            let mut var_content = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '}' {
                    found_close = true;
                    break;
                }
                var_content.push(c);
            }

            if !found_close {
                result.push_str("${");
                result.push_str(&var_content);
                continue;
            }

            let (var_name, default_value) = match var_content.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (var_content.as_str(), None),
            };

            match (self.var(var_name), default_value) {
                (Some(value), _) => result.push_str(&value),
                (None, Some(default)) => result.push_str(default),
                (None, None) => {
                    warn!(variable = var_name, "Environment variable not found");
                    result.push_str(&format!("${{{var_name}}}"));
                }
            }
        }

        result
    }

    /// Applies `<PREFIX>_*` environment overrides.
    fn apply_env_overrides(&self, config: &mut NeasmartConfig) -> ConfigResult<()> {
        if let (key, Some(value)) = self.prefixed("SLAVE_ID") {
            let id: u8 = parse_value(&key, &value, "expected 1..=247")?;
            config.gateway.slave_id =
                SlaveId::new(id).map_err(|e| ConfigError::invalid_env_var(&key, e.to_string()))?;
        }
        if let (_, Some(value)) = self.prefixed("SYNC_ON_STARTUP") {
            config.gateway.sync_on_startup = parse_bool(&value);
        }

        if let (key, Some(value)) = self.prefixed("MODBUS_KIND") {
            config.modbus.kind = parse_bus_kind(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(&key, "expected local, tcp or rtu"))?;
        }
        if let (_, Some(value)) = self.prefixed("MODBUS_HOST") {
            config.modbus.tcp.host = value;
        }
        if let (key, Some(value)) = self.prefixed("MODBUS_PORT") {
            config.modbus.tcp.port = parse_value(&key, &value, "expected valid port number")?;
        }
        if let (_, Some(value)) = self.prefixed("SERIAL_PORT") {
            config.modbus.rtu.port = value;
        }
        if let (key, Some(value)) = self.prefixed("BAUD_RATE") {
            config.modbus.rtu.baud_rate = parse_value(&key, &value, "expected valid baud rate")?;
        }

        if let (_, Some(value)) = self.prefixed("SERVER_ENABLED") {
            config.server.enabled = parse_bool(&value);
        }
        if let (key, Some(value)) = self.prefixed("SERVER_PORT") {
            config.server.port = parse_value(&key, &value, "expected valid port number")?;
        }

        if let (_, Some(value)) = self.prefixed("DATABASE_PATH") {
            config.store.database_path = PathBuf::from(value);
        }
        if let (_, Some(value)) = self.prefixed("ENABLE_FALLBACK") {
            config.store.enable_fallback = parse_bool(&value);
        }
        if let (key, Some(value)) = self.prefixed("RETRY_MAX_ATTEMPTS") {
            config.store.retry_max_attempts = parse_value(&key, &value, "expected valid number")?;
        }

        if let (key, Some(value)) = self.prefixed("CIRCUIT_BREAKER_FAILURE_THRESHOLD") {
            config.circuit_breaker.failure_threshold =
                parse_value(&key, &value, "expected valid number")?;
        }
        if let (key, Some(value)) = self.prefixed("CIRCUIT_BREAKER_RECOVERY_TIMEOUT_SECONDS") {
            config.circuit_breaker.recovery_timeout_seconds =
                parse_value(&key, &value, "expected valid number of seconds")?;
        }

        if let (_, Some(value)) = self.prefixed("API_ENABLED") {
            config.api.enabled = parse_bool(&value);
        }
        if let (key, Some(value)) = self.prefixed("API_BIND") {
            let (address, port) = value
                .rsplit_once(':')
                .ok_or_else(|| ConfigError::invalid_env_var(&key, "expected address:port"))?;
            config.api.bind_address = address.to_string();
            config.api.port = parse_value(&key, port, "expected valid port number")?;
        }
        if let (key, Some(value)) = self.prefixed("API_PORT") {
            config.api.port = parse_value(&key, &value, "expected valid port number")?;
        }

        if let (_, Some(value)) = self.prefixed("LOG_LEVEL") {
            match LogLevel::parse(&value) {
                Some(level) => config.logging.level = level,
                None => warn!(value = %value, "Ignoring unknown log level override"),
            }
        }
        if let (key, Some(value)) = self.prefixed("LOG_FORMAT") {
            config.logging.format = parse_log_format(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(&key, "expected text, compact or json"))?;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn read_file(path: &Path) -> ConfigResult<String> {
    if !path.exists() {
        return Err(ConfigError::file_not_found(path));
    }
    fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
}

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> ConfigResult<T> {
    match format {
        ConfigFormat::Yaml => parse_yaml(content),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

/// YAML goes through the `config` crate.
fn parse_yaml<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

fn parse_value<T: FromStr>(key: &str, value: &str, message: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_env_var(key, message))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

fn parse_bus_kind(value: &str) -> Option<BusKind> {
    match value.to_lowercase().as_str() {
        "local" => Some(BusKind::Local),
        "tcp" => Some(BusKind::Tcp),
        "rtu" | "serial" => Some(BusKind::Rtu),
        _ => None,
    }
}

fn parse_log_format(value: &str) -> Option<LogFormat> {
    match value.to_lowercase().as_str() {
        "text" | "pretty" => Some(LogFormat::Text),
        "compact" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<NeasmartConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<NeasmartConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================
