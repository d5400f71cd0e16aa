// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # neasmart-config
//!
//! Configuration for the Neasmart gateway.
//!
//! ## Features
//!
//! - **Schema Definition**: typed sections with validation
//! - **Multi-Format Support**: YAML, TOML and JSON configuration files
//! - **Environment Overrides**: `NEASMART_*` variables win over the file
//! - **Derived Configs**: store, breaker and manager settings built from one file
//!
//! ## Quick Start
//!
//! ```no_run
//! use neasmart_config::loader::load_config;
//!
//! let config = load_config("neasmart.yaml").unwrap();
//!
//! println!("Slave id: {}", config.gateway.slave_id);
//! println!("Database: {}", config.store.database_path.display());
//! ```
//!
//! ## Configuration Schema
//!
//! - `gateway` - slave id and startup sync
//! - `modbus` - upstream bus (local, tcp or rtu)
//! - `server` - Modbus TCP slave the Neasmart master polls
//! - `store` - SQLite path, fallback and retry policy
//! - `circuit_breaker` - bus failure threshold and recovery
//! - `api` - REST API server settings
//! - `logging` - level and output format
//!
//! ## Environment Variables
//!
//! ```text
//! NEASMART_SLAVE_ID=240
//! NEASMART_DATABASE_PATH=/var/lib/neasmart/registers.db
//! NEASMART_API_BIND=0.0.0.0:5001
//! NEASMART_LOG_LEVEL=debug
//! ```
//!
//! Values in config files can reference environment variables:
//!
//! ```yaml
//! store:
//!   database_path: "${NEASMART_DATA:/var/lib/neasmart}/registers.db"
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigFormat, ConfigLoader, DEFAULT_ENV_PREFIX, load_config, load_config_str};
pub use schema::{
    ApiConfig, CircuitBreakerSettings, CoreSettings, DEFAULT_API_PORT, DEFAULT_DATABASE_PATH,
    DEFAULT_SYNC_BATCH_SIZE, DEFAULT_SYNC_COUNT, GatewayConfig, LogFormat, LogLevel, LoggingConfig, NeasmartConfig,
    StoreSettings, SyncRangeConfig,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
