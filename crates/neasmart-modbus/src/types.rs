// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bus, server and manager configuration types.
//!
//! # Examples
//!
//! ```
//! use neasmart_modbus::types::{BusConfig, BusKind, TcpBusConfig};
//!
//! let bus = BusConfig {
//!     kind: BusKind::Tcp,
//!     tcp: TcpBusConfig::with_host("192.168.1.50"),
//!     ..Default::default()
//! };
//! assert_eq!(bus.tcp.socket_addr(), "192.168.1.50:502");
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use neasmart_core::circuit_breaker::CircuitBreakerConfig;
use neasmart_core::error::ValidationError;
use neasmart_core::types::SlaveId;

// =============================================================================
// BusKind
// =============================================================================

/// Which register bus the manager talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    /// The gateway's own register context (the Neasmart is the master).
    #[default]
    Local,
    /// Modbus TCP client.
    Tcp,
    /// Modbus RTU client over a serial port.
    Rtu,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Local => "local",
            Self::Tcp => "tcp",
            Self::Rtu => "rtu",
        };
        f.write_str(s)
    }
}

// =============================================================================
// TcpBusConfig
// =============================================================================

/// Modbus TCP client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpBusConfig {
    /// Target host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Target port (default: 502).
    #[serde(default = "default_modbus_port")]
    pub port: u16,

    /// Connection timeout.
    #[serde(default = "default_timeout")]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Read/write operation timeout.
    #[serde(default = "default_timeout")]
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_modbus_port() -> u16 {
    502
}

fn default_timeout() -> Duration {
    Duration::from_secs(3)
}

impl Default for TcpBusConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_modbus_port(),
            connect_timeout: default_timeout(),
            operation_timeout: default_timeout(),
        }
    }
}

impl TcpBusConfig {
    /// Creates a configuration for `host` on the default port.
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Returns the `host:port` string.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::invalid_value("modbus.tcp.host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ValidationError::invalid_value("modbus.tcp.port", "must not be 0"));
        }
        if self.connect_timeout.is_zero() || self.operation_timeout.is_zero() {
            return Err(ValidationError::invalid_value(
                "modbus.tcp.operation_timeout",
                "timeouts must be greater than 0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Serial Port Settings
// =============================================================================

/// Data bits configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits (default).
    #[default]
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(format!("unsupported data bits {other} (expected 7 or 8)")),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

/// Parity configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    /// No parity (default).
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

impl Parity {
    /// Returns the short character representation.
    pub const fn char(&self) -> char {
        match self {
            Self::None => 'N',
            Self::Odd => 'O',
            Self::Even => 'E',
        }
    }
}

/// Stop bits configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    /// 1 stop bit (default).
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("unsupported stop bits {other} (expected 1 or 2)")),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

// =============================================================================
// RtuBusConfig
// =============================================================================

/// Modbus RTU client configuration. Defaults to 38400 8N1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtuBusConfig {
    /// Serial port path.
    #[serde(default = "default_serial_port")]
    pub port: String,

    /// Baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Data bits.
    #[serde(default)]
    pub data_bits: DataBits,

    /// Parity.
    #[serde(default)]
    pub parity: Parity,

    /// Stop bits.
    #[serde(default)]
    pub stop_bits: StopBits,

    /// Per-operation timeout.
    #[serde(default = "default_timeout")]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    38_400
}

impl Default for RtuBusConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            timeout: default_timeout(),
        }
    }
}

impl RtuBusConfig {
    /// Returns the frame format, e.g. `8N1`.
    pub fn frame_format(&self) -> String {
        format!(
            "{}{}{}",
            u8::from(self.data_bits),
            self.parity.char(),
            u8::from(self.stop_bits)
        )
    }

    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port.trim().is_empty() {
            return Err(ValidationError::invalid_value("modbus.rtu.port", "must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(ValidationError::invalid_value("modbus.rtu.baud_rate", "must not be 0"));
        }
        if self.timeout.is_zero() {
            return Err(ValidationError::invalid_value(
                "modbus.rtu.timeout",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// BusConfig
// =============================================================================

/// Register bus selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bus implementation to use.
    #[serde(default)]
    pub kind: BusKind,

    /// TCP settings, used when `kind` is `tcp`.
    #[serde(default)]
    pub tcp: TcpBusConfig,

    /// RTU settings, used when `kind` is `rtu`.
    #[serde(default)]
    pub rtu: RtuBusConfig,
}

impl BusConfig {
    /// Validates the settings of the selected bus.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.kind {
            BusKind::Local => Ok(()),
            BusKind::Tcp => self.tcp.validate(),
            BusKind::Rtu => self.rtu.validate(),
        }
    }
}

// =============================================================================
// ServerConfig
// =============================================================================

/// Modbus TCP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Whether to serve the register context.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Listen port.
    #[serde(default = "default_modbus_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            port: default_modbus_port(),
        }
    }
}

impl ServerConfig {
    /// Returns the listen address string.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

// =============================================================================
// ManagerConfig
// =============================================================================

/// Register manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Slave id the manager owns a register context for.
    #[serde(default)]
    pub slave_id: SlaveId,

    /// Maximum registers per bus read during a batch sync.
    #[serde(default = "default_sync_batch_size")]
    pub sync_batch_size: u16,

    /// Breaker guarding bus calls.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

fn default_sync_batch_size() -> u16 {
    100
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            slave_id: SlaveId::default(),
            sync_batch_size: default_sync_batch_size(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Creates a configuration for `slave_id`.
    pub fn for_slave(slave_id: SlaveId) -> Self {
        Self {
            slave_id,
            ..Default::default()
        }
    }

    /// Sets the breaker configuration.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Sets the sync batch size (clamped to the Modbus limit of 125).
    pub fn with_sync_batch_size(mut self, size: u16) -> Self {
        self.sync_batch_size = size.clamp(1, MAX_READ_COUNT);
        self
    }
}

/// Maximum registers a single FC 0x03 request may read.
pub const MAX_READ_COUNT: u16 = 125;

// =============================================================================
// Tests
// =============================================================================
