// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the gateway binary.
//!
//! The process exit code names the part of the gateway that failed:
//!
//! | Code | Failure                                       |
//! |------|-----------------------------------------------|
//! | 1    | anything else (task panic, output rendering)  |
//! | 2    | configuration file or validation              |
//! | 3    | register store (database or fallback)         |
//! | 4    | Modbus bus or register manager               |
//! | 5    | Modbus server or REST API listener            |
//! | 6    | process setup (logging, signal handlers)      |

use thiserror::Error;

use neasmart_api::ApiError;
use neasmart_config::ConfigError;
use neasmart_core::StoreError;
use neasmart_modbus::ManagerError;

/// Result type alias for binary operations.
pub type BinResult<T> = Result<T, BinError>;

/// Exit code for failures without a more specific category.
pub const EXIT_RUNTIME: i32 = 1;
/// Exit code for configuration failures.
pub const EXIT_CONFIG: i32 = 2;
/// Exit code for register store failures.
pub const EXIT_STORE: i32 = 3;
/// Exit code for bus and manager failures.
pub const EXIT_BUS: i32 = 4;
/// Exit code for listener failures.
pub const EXIT_LISTENER: i32 = 5;
/// Exit code for logging and signal setup failures.
pub const EXIT_SETUP: i32 = 6;

/// Errors that stop the gateway process.
#[derive(Debug, Error)]
pub enum BinError {
    /// The configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The register store could not be opened or used.
    #[error("Register store error: {0}")]
    Store(#[from] StoreError),

    /// The register manager, its bus or the Modbus server failed.
    #[error("Modbus error: {0}")]
    Modbus(#[from] ManagerError),

    /// The REST API server failed.
    #[error("REST API error: {0}")]
    Api(#[from] ApiError),

    /// A listener could not be bound.
    #[error("Failed to bind {service} on {address}: {reason}")]
    Bind {
        /// Which server was binding.
        service: &'static str,
        /// Requested listen address.
        address: String,
        /// Underlying failure.
        reason: String,
    },

    /// Logging or signal handling could not be installed.
    #[error("Process setup failed: {0}")]
    Setup(String),

    /// Any other failure.
    #[error("{0}")]
    Runtime(String),

    /// An error with a description of what was being attempted.
    #[error("{context}: {source}")]
    WithContext {
        /// What was being attempted.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Creates a listener bind error.
    pub fn bind(service: &'static str, address: impl Into<String>, reason: impl ToString) -> Self {
        Self::Bind {
            service,
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a process setup error.
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Creates an uncategorized error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Adds context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => EXIT_CONFIG,
            Self::Store(_) => EXIT_STORE,
            Self::Modbus(e) => manager_exit_code(e),
            Self::Api(ApiError::Manager(e)) => manager_exit_code(e),
            Self::Api(_) => EXIT_LISTENER,
            Self::Bind { .. } => EXIT_LISTENER,
            Self::Setup(_) => EXIT_SETUP,
            Self::Runtime(_) => EXIT_RUNTIME,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }
}

fn manager_exit_code(error: &ManagerError) -> i32 {
    match error {
        ManagerError::Store(_) => EXIT_STORE,
        ManagerError::Server { .. } => EXIT_LISTENER,
        _ => EXIT_BUS,
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Runtime(err.to_string())
    }
}

impl From<anyhow::Error> for BinError {
    fn from(err: anyhow::Error) -> Self {
        Self::Runtime(format!("{err:#}"))
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Prints `error` and its causes on stderr.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {error}");

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {cause}");
        source = cause.source();
    }
}

/// Prints `error` and exits with its category's code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use neasmart_core::BusError;

    #[test]
    fn test_bind_error_message() {
        let err = BinError::bind("REST API", "0.0.0.0:8080", "address in use");
        assert_eq!(
            err.to_string(),
            "Failed to bind REST API on 0.0.0.0:8080: address in use"
        );
        assert_eq!(err.exit_code(), EXIT_LISTENER);
    }

    #[test]
    fn test_context_keeps_category() {
        let err = BinError::from(ManagerError::server("failed to bind 0.0.0.0:502"))
            .with_context("Starting Modbus server");
        assert!(err.to_string().starts_with("Starting Modbus server: "));
        assert_eq!(err.exit_code(), EXIT_LISTENER);
    }

    #[test]
    fn test_exit_codes_follow_gateway_component() {
        let config = ConfigError::validation("gateway.slave_id", "must be 1..=240");
        assert_eq!(BinError::from(config).exit_code(), EXIT_CONFIG);

        let store = StoreError::unavailable("database is locked");
        assert_eq!(BinError::from(store).exit_code(), EXIT_STORE);

        let store_via_manager = ManagerError::from(StoreError::unavailable("locked"));
        assert_eq!(BinError::from(store_via_manager).exit_code(), EXIT_STORE);

        let bus = ManagerError::from(BusError::NotConnected);
        assert_eq!(BinError::from(bus).exit_code(), EXIT_BUS);
        assert_eq!(
            BinError::from(ApiError::from(ManagerError::CircuitOpen)).exit_code(),
            EXIT_BUS
        );
        assert_eq!(
            BinError::from(ApiError::internal("serve loop ended")).exit_code(),
            EXIT_LISTENER
        );

        assert_eq!(BinError::setup("SIGTERM").exit_code(), EXIT_SETUP);
        assert_eq!(BinError::runtime("render").exit_code(), EXIT_RUNTIME);
    }
}
