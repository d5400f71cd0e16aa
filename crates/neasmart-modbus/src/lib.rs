// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # neasmart-modbus
//!
//! Modbus side of the Neasmart gateway.
//!
//! - **Buses**: Modbus TCP and RTU clients built on `tokio-modbus`, plus a
//!   loopback bus over the gateway's own register image
//! - **Register context**: the holding registers served to the Neasmart master
//! - **Modbus server**: a `tokio-modbus` TCP slave over the context
//! - **Manager**: circuit-broken bus access with cached fallback and
//!   persistence
//!
//! ## Architecture
//!
//! ```text
//!   Neasmart master ──► ModbusServer ──► apply_remote_write ─┐
//!                                                            ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ModbusManager                           │
//! └──────────┬──────────────────────┬───────────────────────┬───────┘
//!            ▼                      ▼                       ▼
//!     CircuitBreaker ──►   RegisterBus (tcp/rtu/local)  PersistentRegisterStore
//!                                   │
//!                                   ▼
//!                            RegisterContext
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use neasmart_modbus::{ManagerConfig, ModbusManager};
//!
//! let manager = Arc::new(ModbusManager::local(ManagerConfig::default(), store));
//! manager.restore_context().await?;
//!
//! let read = manager.read_register(240, 10).await?;
//! println!("{} = {} ({:?})", read.address, read.value, read.origin);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod bus;
pub mod client;
pub mod context;
pub mod error;
pub mod local;
pub mod manager;
pub mod server;
pub mod types;

// =============================================================================
// Re-exports
// =============================================================================

pub use bus::{RegisterBus, SharedBus, build_bus};
pub use client::{ModbusRtuBus, ModbusTcpBus};
pub use context::RegisterContext;
pub use error::{ManagerError, ManagerResult};
pub use local::LocalBus;
pub use manager::{
    ManagerHealth, ModbusManager, RegisterRead, SharedManager, SyncReport, WriteAck,
};
pub use server::{ModbusServer, RegisterService};
pub use types::{
    BusConfig, BusKind, DataBits, MAX_READ_COUNT, ManagerConfig, Parity, RtuBusConfig,
    ServerConfig, StopBits, TcpBusConfig,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
