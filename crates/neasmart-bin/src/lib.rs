// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # neasmart-bin
//!
//! `neasmart` binary: CLI parsing, logging setup, component wiring and
//! graceful shutdown.
//!
//! ## Architecture
//!
//! ```text
//!                         main.rs
//!                            │
//!                         cli.rs
//!                            │
//!               ┌────────────┼────────────┐
//!               ▼            ▼            ▼
//!           commands      runtime      logging
//!                            │
//!        ┌───────────────────┼────────────────────┐
//!        ▼                   ▼                    ▼
//!  PersistentRegisterStore  ModbusManager ──► ModbusServer / ApiServer
//!                            │
//!                         shutdown
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the gateway (default command)
//! neasmart
//!
//! # Start with custom config and JSON logs
//! neasmart -c /etc/neasmart/neasmart.yaml --log-format json
//!
//! # Validate configuration
//! neasmart validate --show-config
//!
//! # Show version
//! neasmart version
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{GatewayRuntime, RuntimeBuilder, build_manager};
pub use shutdown::{ShutdownCoordinator, ShutdownGuard, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
