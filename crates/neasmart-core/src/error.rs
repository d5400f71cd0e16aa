// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error hierarchy shared by the gateway crates.
//!
//! Errors are split by how the resilience layer reacts to them:
//!
//! ```text
//! NeasmartError (root)
//! ├── ValidationError - caller contract violations, surfaced immediately
//! ├── CodecError      - DPT 9.001 input outside the encodable domain
//! ├── StoreError      - durable backend failures (retried, then fallback)
//! └── BusError        - physical Modbus failures (counted by the breaker)
//! ```
//!
//! # Examples
//!
//! ```
//! use neasmart_core::error::{BusError, NeasmartError};
//! use std::time::Duration;
//!
//! let error = BusError::timeout(Duration::from_secs(3));
//! assert!(error.is_retryable());
//!
//! let root: NeasmartError = error.into();
//! assert_eq!(root.error_type(), "bus");
//! ```

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// NeasmartError - Root Error Type
// =============================================================================

/// The root error type for the gateway core.
#[derive(Debug, Error)]
pub enum NeasmartError {
    /// Caller passed invalid input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Temperature codec error.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Register store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Modbus bus error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

impl NeasmartError {
    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            NeasmartError::Store(e) => e.is_retryable(),
            NeasmartError::Bus(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            NeasmartError::Validation(_) => "validation",
            NeasmartError::Codec(_) => "codec",
            NeasmartError::Store(_) => "store",
            NeasmartError::Bus(_) => "bus",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            NeasmartError::Validation(_) => 400,
            NeasmartError::Codec(_) => 422,
            NeasmartError::Store(_) => 503,
            NeasmartError::Bus(e) => e.status_code(),
        }
    }
}

// =============================================================================
// ValidationError
// =============================================================================

/// Caller contract violations.
///
/// These are never retried and never coerced into a nearby legal value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Register address outside 0..=65535.
    #[error("Invalid register address {address}: must be within 0..=65535")]
    InvalidAddress {
        /// The rejected address.
        address: u32,
    },

    /// Address range that is empty or runs past the end of the address space.
    #[error("Invalid register range start={start} count={count}")]
    InvalidRange {
        /// First address.
        start: u32,
        /// Number of registers.
        count: u32,
    },

    /// Slave id outside the Modbus unicast range.
    #[error("Invalid slave id {slave_id}: must be within 1..=247")]
    InvalidSlaveId {
        /// The rejected slave id.
        slave_id: u8,
    },

    /// Slave id the manager owns no register context for.
    #[error("Unknown slave id {slave_id}")]
    UnknownSlave {
        /// The requested slave id.
        slave_id: u8,
    },

    /// Any other invalid field.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Error message.
        message: String,
    },
}

impl ValidationError {
    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// CodecError
// =============================================================================

/// DPT 9.001 codec errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    /// NaN or infinity.
    #[error("Value {value} is not a finite number")]
    NotFinite {
        /// The rejected value.
        value: f64,
    },

    /// Finite value outside the encodable range.
    #[error("Value {value} is outside the encodable range [{min}, {max}]")]
    OutOfRange {
        /// The rejected value.
        value: f64,
        /// Smallest encodable value.
        min: f64,
        /// Largest encodable value.
        max: f64,
    },
}

impl CodecError {
    /// Creates an out-of-range error for `value`.
    pub fn out_of_range(value: f64) -> Self {
        let (min, max) = crate::dpt9001::valid_range();
        Self::OutOfRange { value, min, max }
    }
}

// =============================================================================
// StoreError
// =============================================================================

/// Register store errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The durable backend failed an operation. Transient.
    #[error("Database error during {operation}: {message}")]
    Database {
        /// Operation that failed (get, set, ping, ...).
        operation: String,
        /// Error message.
        message: String,
    },

    /// A stored row could not be interpreted. Affects one address only.
    #[error("Corrupt value at address {address}: {message}")]
    Corrupt {
        /// The affected address.
        address: u16,
        /// Error message.
        message: String,
    },

    /// Neither the backend nor the fallback can serve the request.
    #[error("Register store unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },
}

impl StoreError {
    /// Creates a database error.
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a corrupt value error.
    pub fn corrupt(address: u16, message: impl Into<String>) -> Self {
        Self::Corrupt {
            address,
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database { .. })
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            StoreError::Database { .. } => "database",
            StoreError::Corrupt { .. } => "corrupt",
            StoreError::Unavailable { .. } => "unavailable",
        }
    }
}

// =============================================================================
// BusError
// =============================================================================

/// Physical Modbus bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// Could not open the TCP connection or serial port.
    #[error("Connection to {target} failed: {message}")]
    ConnectionFailed {
        /// Host:port or serial port path.
        target: String,
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No live connection.
    #[error("Not connected")]
    NotConnected,

    /// The operation did not complete in time.
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// Read request failed.
    #[error("Read of {count} register(s) at {address} failed: {message}")]
    ReadFailed {
        /// First address.
        address: u16,
        /// Number of registers.
        count: u16,
        /// Error message.
        message: String,
    },

    /// Write request failed.
    #[error("Write to register {address} failed: {message}")]
    WriteFailed {
        /// Register address.
        address: u16,
        /// Error message.
        message: String,
    },

    /// The device answered with a Modbus exception.
    #[error("Modbus exception {code:#04x} for function {function:#04x}")]
    Exception {
        /// Function code.
        function: u8,
        /// Exception code.
        code: u8,
    },

    /// The response did not match the request.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },
}

impl BusError {
    /// Creates a connection failed error.
    pub fn connection_failed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            target: target.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a connection failed error with a source.
    pub fn connection_failed_with_source(
        target: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConnectionFailed {
            target: target.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Creates a read failed error.
    pub fn read_failed(address: u16, count: u16, message: impl Into<String>) -> Self {
        Self::ReadFailed {
            address,
            count,
            message: message.into(),
        }
    }

    /// Creates a write failed error.
    pub fn write_failed(address: u16, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            address,
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Returns `true` if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BusError::Timeout { .. } | BusError::ConnectionFailed { .. } | BusError::NotConnected
        )
    }

    /// Returns `true` if the connection should be dropped and reopened.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            BusError::ConnectionFailed { .. } | BusError::NotConnected | BusError::Timeout { .. }
        )
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            BusError::Timeout { .. } => 504,
            BusError::Exception { .. } | BusError::InvalidResponse { .. } => 502,
            _ => 503,
        }
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            BusError::ConnectionFailed { .. } => "connection_failed",
            BusError::NotConnected => "not_connected",
            BusError::Timeout { .. } => "timeout",
            BusError::ReadFailed { .. } => "read_failed",
            BusError::WriteFailed { .. } => "write_failed",
            BusError::Exception { .. } => "exception",
            BusError::InvalidResponse { .. } => "invalid_response",
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

// =============================================================================
// Tests
// =============================================================================
