// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Register backend trait and store configuration.
//!
//! A [`RegisterBackend`] is a plain address → value medium. It knows nothing
//! about retries or degradation; the [`PersistentRegisterStore`] layers both
//! on top.
//!
//! [`PersistentRegisterStore`]: crate::PersistentRegisterStore

use std::fmt::Debug;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use neasmart_core::error::StoreResult;
use neasmart_core::retry::RetryConfig;
use neasmart_core::types::RegisterEntry;

// =============================================================================
// RegisterBackend
// =============================================================================

/// Storage medium for holding register values.
#[async_trait]
pub trait RegisterBackend: Send + Sync + Debug {
    /// Returns the stored value, or `None` if the address was never written.
    ///
    /// A row that cannot be interpreted yields `StoreError::Corrupt`.
    async fn get(&self, address: u16) -> StoreResult<Option<u16>>;

    /// Inserts or replaces the entry for `entry.address`.
    async fn set(&self, entry: &RegisterEntry) -> StoreResult<()>;

    /// Returns every readable entry in ascending address order.
    async fn entries(&self) -> StoreResult<Vec<RegisterEntry>>;

    /// Cheap liveness check.
    async fn ping(&self) -> StoreResult<()>;

    /// Backend name for logs and health output.
    fn name(&self) -> &str;
}

// =============================================================================
// StoreConfig
// =============================================================================

/// Configuration for the persistent register store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Value returned for addresses that were never written.
    #[serde(default)]
    pub default_value: u16,

    /// Redirect reads and writes to memory once the backend is exhausted.
    #[serde(default = "default_enable_fallback")]
    pub enable_fallback: bool,

    /// Retry policy for backend operations.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_path() -> PathBuf {
    PathBuf::from("./data/registers.db")
}

fn default_enable_fallback() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            default_value: 0,
            enable_fallback: default_enable_fallback(),
            retry: RetryConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }
}

/// Builder for StoreConfig.
#[derive(Debug, Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Sets the database path.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Sets the value returned for unwritten addresses.
    pub fn default_value(mut self, value: u16) -> Self {
        self.config.default_value = value;
        self
    }

    /// Enables or disables the in-memory fallback.
    pub fn enable_fallback(mut self, enabled: bool) -> Self {
        self.config.enable_fallback = enabled;
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> StoreConfig {
        self.config
    }
}

// =============================================================================
// StoreStatus
// =============================================================================

/// Health view of the register store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    /// Whether the last backend check succeeded.
    pub healthy: bool,
    /// Whether reads and writes are being served by the fallback.
    pub using_fallback: bool,
    /// Durable backend name.
    pub backend: String,
    /// Entries waiting in the fallback for a resync.
    pub fallback_entries: usize,
    /// Last backend error, if any.
    pub last_error: Option<String>,
}
