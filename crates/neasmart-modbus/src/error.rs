// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Register manager error types.
//!
//! Most bus trouble never reaches the caller: reads fall back to cached
//! values and writes report `bus_confirmed = false`. What remains is listed
//! here.
//!
//! ```text
//! ManagerError
//! ├── Validation  - unknown slave, bad range (never retried)
//! ├── Codec       - temperature outside the DPT 9.001 domain
//! ├── Store       - the register store cannot serve at all
//! ├── Bus         - bus failure on an operation without a cached answer
//! ├── CircuitOpen - breaker rejected an operation without a cached answer
//! └── Server      - the Modbus server could not start
//! ```

use thiserror::Error;

use neasmart_core::circuit_breaker::CircuitError;
use neasmart_core::error::{BusError, CodecError, NeasmartError, StoreError, ValidationError};

/// Errors returned by the register manager and the Modbus server.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Caller passed invalid input.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Temperature codec error.
    #[error("{0}")]
    Codec(#[from] CodecError),

    /// Register store error.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Bus error.
    #[error("{0}")]
    Bus(#[from] BusError),

    /// The circuit breaker rejected the call.
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// The Modbus server failed.
    #[error("Modbus server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },
}

impl ManagerError {
    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Returns `true` if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ManagerError::Store(e) => e.is_retryable(),
            ManagerError::Bus(e) => e.is_retryable(),
            ManagerError::CircuitOpen => true,
            _ => false,
        }
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            ManagerError::Validation(_) => "validation",
            ManagerError::Codec(_) => "codec",
            ManagerError::Store(_) => "store",
            ManagerError::Bus(_) => "bus",
            ManagerError::CircuitOpen => "circuit_open",
            ManagerError::Server { .. } => "server",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ManagerError::Validation(_) => 400,
            ManagerError::Codec(_) => 422,
            ManagerError::Store(_) | ManagerError::CircuitOpen => 503,
            ManagerError::Bus(e) => e.status_code(),
            ManagerError::Server { .. } => 500,
        }
    }
}

impl From<CircuitError<BusError>> for ManagerError {
    fn from(error: CircuitError<BusError>) -> Self {
        match error {
            CircuitError::Open => ManagerError::CircuitOpen,
            CircuitError::Timeout(duration) => ManagerError::Bus(BusError::timeout(duration)),
            CircuitError::Inner(e) => ManagerError::Bus(e),
        }
    }
}

impl From<NeasmartError> for ManagerError {
    fn from(error: NeasmartError) -> Self {
        match error {
            NeasmartError::Validation(e) => ManagerError::Validation(e),
            NeasmartError::Codec(e) => ManagerError::Codec(e),
            NeasmartError::Store(e) => ManagerError::Store(e),
            NeasmartError::Bus(e) => ManagerError::Bus(e),
        }
    }
}

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;
