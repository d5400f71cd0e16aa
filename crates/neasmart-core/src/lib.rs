// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # neasmart-core
//!
//! Shared types and resilience primitives for the Neasmart 2.0 Modbus gateway.
//!
//! This crate provides the building blocks used by every other gateway crate:
//!
//! - **Types**: `SlaveId`, `RegisterEntry`, `RegisterRange`, value provenance
//! - **Error**: Unified error hierarchy (validation, codec, store, bus)
//! - **CircuitBreaker**: Explicit Closed/Open/HalfOpen state machine
//! - **Retry**: Bounded exponential backoff returning an explicit outcome
//! - **DPT 9.001**: Two-byte float codec used by temperature registers
//!
//! ## Example
//!
//! ```rust
//! use neasmart_core::dpt9001;
//! use neasmart_core::types::{RegisterEntry, WriteSource};
//!
//! let raw = dpt9001::encode(21.5).unwrap();
//! let entry = RegisterEntry::new(100, raw, WriteSource::Api);
//! assert_eq!(dpt9001::decode(entry.value), 21.5);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod types;

// =============================================================================
// Resilience Modules
// =============================================================================

pub mod circuit_breaker;
pub mod retry;

// =============================================================================
// Codec Modules
// =============================================================================

pub mod dpt9001;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use types::*;

pub use circuit_breaker::{
    Admission, BreakerEvent, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerConfigBuilder, CircuitBreakerMetrics, CircuitError, CircuitState,
    SharedCircuitBreaker, Transition,
};

pub use retry::{
    ExponentialBackoff, NoRetry, RetryConfig, RetryDecision, RetryOutcome, RetryStrategy,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
