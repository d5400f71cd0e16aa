// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Neasmart Integration Tests
//!
//! Cross-crate tests for the Neasmart gateway plus the helpers they share.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `fixtures`: Stores, managers and configurations ready to use
//!   - `mocks`: Scriptable bus and failure-injecting store backend
//!   - `harness`: A Modbus server running on an ephemeral port
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p neasmart-tests
//!
//! # Run specific test suite
//! cargo test -p neasmart-tests --test integration_core
//! cargo test -p neasmart-tests --test integration_store
//! cargo test -p neasmart-tests --test integration_modbus
//! cargo test -p neasmart-tests --test integration_config
//! cargo test -p neasmart-tests --test integration_api
//! ```
//!
//! ## Test Categories
//!
//! ### Core Tests (`integration_core.rs`)
//! - DPT 9.001 codec against known register words
//! - Circuit breaker lifecycle
//! - Retry budgets
//!
//! ### Store Tests (`integration_store.rs`)
//! - SQLite persistence across reopen
//! - Fallback activation, shadowing and resync
//!
//! ### Modbus Tests (`integration_modbus.rs`)
//! - Manager fallback to cached values
//! - Batch sync with partial failures
//! - Modbus TCP server and client over a real socket
//!
//! ### Config Tests (`integration_config.rs`)
//! - File formats, placeholders and environment overrides
//! - Mapping into store and manager configuration
//!
//! ### API Tests (`integration_api.rs`)
//! - REST endpoints over a shared manager
//! - Degraded health reporting
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use neasmart_tests::prelude::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let bus = Arc::new(ScriptedBus::with_values([(10, 215)]));
//!     let manager = scripted_manager(bus.clone());
//!     // ... test logic
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
    pub use crate::common::{init_test_logging, temp_test_dir};
    pub use std::sync::Arc;
}
