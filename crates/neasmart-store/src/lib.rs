// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # neasmart-store
//!
//! Durable holding-register storage for the Neasmart gateway.
//!
//! Register values live in a SQLite table. Transient database errors are
//! retried with exponential backoff; once retries are exhausted the store
//! keeps serving from an in-memory fallback instead of failing the caller.
//!
//! ## Example
//!
//! ```rust,ignore
//! use neasmart_store::{PersistentRegisterStore, StoreConfig};
//! use neasmart_core::types::WriteSource;
//!
//! let store = PersistentRegisterStore::open(StoreConfig::default()).await?;
//! store.set(100, 2150, WriteSource::Api).await?;
//! assert_eq!(store.get(100).await?, 2150);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod memory;
pub mod sqlite;
pub mod store;
pub mod traits;

pub use memory::{MemoryFallback, ValueMirror};
pub use sqlite::SqliteBackend;
pub use store::{PersistentRegisterStore, SharedRegisterStore};
pub use traits::{RegisterBackend, StoreConfig, StoreConfigBuilder, StoreStatus};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
