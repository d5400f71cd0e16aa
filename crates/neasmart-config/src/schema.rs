// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema for the Neasmart gateway.
//!
//! # Schema Structure
//!
//! ```text
//! NeasmartConfig
//! ├── gateway: GatewayConfig
//! ├── modbus: BusConfig
//! ├── server: ServerConfig
//! ├── store: StoreSettings
//! ├── circuit_breaker: CircuitBreakerSettings
//! ├── api: ApiConfig
//! └── logging: LoggingConfig
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use neasmart_core::circuit_breaker::CircuitBreakerConfig;
use neasmart_core::error::ValidationError;
use neasmart_core::retry::RetryConfig;
use neasmart_core::types::{RegisterRange, SlaveId};
use neasmart_modbus::{BusConfig, MAX_READ_COUNT, ManagerConfig, ServerConfig};
use neasmart_store::StoreConfig;

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// Default REST API port.
pub const DEFAULT_API_PORT: u16 = 5001;

/// Default number of registers read by the startup sync.
pub const DEFAULT_SYNC_COUNT: u32 = 1024;

/// Default registers per batch sync read.
pub const DEFAULT_SYNC_BATCH_SIZE: u16 = 100;

/// Default register database path.
pub const DEFAULT_DATABASE_PATH: &str = "./data/registers.db";

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeasmartConfig {
    /// Gateway identity and startup behavior.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Bus the manager talks to.
    #[serde(default)]
    pub modbus: BusConfig,

    /// Modbus TCP server served to the Neasmart master.
    #[serde(default)]
    pub server: ServerConfig,

    /// Register store.
    #[serde(default)]
    pub store: StoreSettings,

    /// Breaker guarding bus calls.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// REST API.
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NeasmartConfig {
    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.gateway.validate()?;
        self.modbus.validate().map_err(from_validation)?;
        validate_server(&self.server)?;
        self.store.validate()?;
        self.circuit_breaker.validate()?;
        self.api.validate()?;

        if self.server.enabled
            && self.api.enabled
            && self.server.port == self.api.port
            && self.server.bind_address == self.api.bind_address
        {
            return Err(ConfigError::validation(
                "api.port",
                format!("conflicts with server.port {}", self.server.port),
            ));
        }
        Ok(())
    }

    /// Returns the settings the resilience core is built from.
    pub fn core_settings(&self) -> CoreSettings {
        CoreSettings {
            slave_id: self.gateway.slave_id,
            circuit_breaker_failure_threshold: self.circuit_breaker.failure_threshold,
            circuit_breaker_recovery_timeout_seconds: self
                .circuit_breaker
                .recovery_timeout_seconds,
            database_path: self.store.database_path.clone(),
            enable_fallback: self.store.enable_fallback,
            retry_max_attempts: self.store.retry_max_attempts,
            sync_on_startup: self.gateway.sync_on_startup,
        }
    }

    /// Builds the register store configuration.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::builder()
            .path(self.store.database_path.clone())
            .enable_fallback(self.store.enable_fallback)
            .retry(
                RetryConfig::with_max_attempts(self.store.retry_max_attempts)
                    .initial_delay(self.store.retry_initial_delay),
            )
            .build()
    }

    /// Builds the breaker configuration.
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .failure_threshold(self.circuit_breaker.failure_threshold)
            .recovery_timeout(self.circuit_breaker.recovery_timeout())
            .call_timeout(self.circuit_breaker.call_timeout)
            .build()
    }

    /// Builds the manager configuration.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::for_slave(self.gateway.slave_id)
            .with_circuit_breaker(self.breaker_config())
            .with_sync_batch_size(self.gateway.sync_batch_size)
    }
}

/// Values consumed by the resilience core.
///
/// The core never parses files or environment variables itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreSettings {
    /// Modbus slave id.
    pub slave_id: SlaveId,
    /// Failures before the breaker opens.
    pub circuit_breaker_failure_threshold: u32,
    /// Seconds before an open breaker admits a trial call.
    pub circuit_breaker_recovery_timeout_seconds: u64,
    /// SQLite database path.
    pub database_path: PathBuf,
    /// Whether the store may fall back to memory.
    pub enable_fallback: bool,
    /// Store attempts per operation.
    pub retry_max_attempts: u32,
    /// Whether to sync from the bus at startup.
    pub sync_on_startup: bool,
}

fn from_validation(error: ValidationError) -> ConfigError {
    match error {
        ValidationError::InvalidValue { field, message } => ConfigError::validation(field, message),
        other => ConfigError::validation("modbus", other.to_string()),
    }
}

fn validate_server(server: &ServerConfig) -> ConfigResult<()> {
    if !server.enabled {
        return Ok(());
    }
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::validation("server.bind_address", "cannot be empty"));
    }
    if server.port == 0 {
        return Err(ConfigError::validation("server.port", "cannot be zero"));
    }
    Ok(())
}

// =============================================================================
// Gateway Configuration
// =============================================================================

/// Gateway identity and startup behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Modbus slave id (1..=247).
    #[serde(default)]
    pub slave_id: SlaveId,

    /// Run a batch sync from the bus before serving.
    #[serde(default)]
    pub sync_on_startup: bool,

    /// Registers read by the startup sync.
    #[serde(default)]
    pub sync_range: SyncRangeConfig,

    /// Registers per bus read during a batch sync (1..=125).
    #[serde(default = "default_sync_batch_size")]
    pub sync_batch_size: u16,
}

fn default_sync_batch_size() -> u16 {
    DEFAULT_SYNC_BATCH_SIZE
}

impl GatewayConfig {
    /// Validates the gateway configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.sync_range.to_range()?;
        if self.sync_batch_size == 0 || self.sync_batch_size > MAX_READ_COUNT {
            return Err(ConfigError::validation(
                "gateway.sync_batch_size",
                format!("must be between 1 and {MAX_READ_COUNT}"),
            ));
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            slave_id: SlaveId::default(),
            sync_on_startup: false,
            sync_range: SyncRangeConfig::default(),
            sync_batch_size: DEFAULT_SYNC_BATCH_SIZE,
        }
    }
}

/// Contiguous register range for the startup sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncRangeConfig {
    /// First address.
    #[serde(default)]
    pub start: u16,

    /// Number of registers, up to 65536 for the whole address space.
    #[serde(default = "default_sync_count")]
    pub count: u32,
}

fn default_sync_count() -> u32 {
    DEFAULT_SYNC_COUNT
}

impl SyncRangeConfig {
    /// Converts to a validated register range.
    pub fn to_range(&self) -> ConfigResult<RegisterRange> {
        RegisterRange::contiguous(self.start, self.count).map_err(|_| {
            ConfigError::validation(
                "gateway.sync_range",
                format!(
                    "start {} + count {} must be non-empty and end at or before 65536",
                    self.start, self.count
                ),
            )
        })
    }
}

impl Default for SyncRangeConfig {
    fn default() -> Self {
        Self {
            start: 0,
            count: DEFAULT_SYNC_COUNT,
        }
    }
}

// =============================================================================
// Store Configuration
// =============================================================================

/// Register store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    /// SQLite database path.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Serve from memory when the database is unavailable.
    #[serde(default = "default_enabled")]
    pub enable_fallback: bool,

    /// Attempts per storage operation.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_retry_initial_delay", with = "humantime_serde")]
    pub retry_initial_delay: Duration,
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

fn default_enabled() -> bool {
    true
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_initial_delay() -> Duration {
    Duration::from_millis(100)
}

impl StoreSettings {
    /// Validates the store settings.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::validation("store.database_path", "cannot be empty"));
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::validation(
                "store.retry_max_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            enable_fallback: true,
            retry_max_attempts: default_retry_max_attempts(),
            retry_initial_delay: default_retry_initial_delay(),
        }
    }
}

// =============================================================================
// Circuit Breaker Configuration
// =============================================================================

/// Circuit breaker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before opening.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds before an open breaker admits a trial call.
    #[serde(default = "default_recovery_timeout_seconds")]
    pub recovery_timeout_seconds: u64,

    /// Bound on each bus call. Omit to disable.
    #[serde(default = "default_call_timeout", with = "humantime_serde")]
    pub call_timeout: Option<Duration>,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_seconds() -> u64 {
    60
}

fn default_call_timeout() -> Option<Duration> {
    Some(Duration::from_secs(3))
}

impl CircuitBreakerSettings {
    /// Validates the breaker settings.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::validation(
                "circuit_breaker.failure_threshold",
                "cannot be zero",
            ));
        }
        if self.recovery_timeout_seconds == 0 {
            return Err(ConfigError::validation(
                "circuit_breaker.recovery_timeout_seconds",
                "cannot be zero",
            ));
        }
        if self.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::validation(
                "circuit_breaker.call_timeout",
                "cannot be zero",
            ));
        }
        Ok(())
    }

    /// Returns the recovery timeout as a Duration.
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_seconds)
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_seconds: default_recovery_timeout_seconds(),
            call_timeout: default_call_timeout(),
        }
    }
}

// =============================================================================
// API Configuration
// =============================================================================

/// REST API server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Whether the API is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Listen port.
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Request timeout.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl ApiConfig {
    /// Validates the API configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::validation("api.bind_address", "cannot be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::validation("api.port", "cannot be zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::validation("api.request_timeout", "cannot be zero"));
        }
        Ok(())
    }

    /// Returns the `address:port` to listen on.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            port: DEFAULT_API_PORT,
            request_timeout: default_request_timeout(),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name, case-insensitively.
    pub fn parse(level: &str) -> Option<Self> {
        match level.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    #[serde(alias = "pretty")]
    Text,
    /// Compact single-line text.
    Compact,
    /// JSON lines.
    Json,
}
