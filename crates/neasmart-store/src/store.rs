// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Persistent register store with retry and in-memory fallback.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  PersistentRegisterStore                     │
//! │                                                              │
//! │   get / set / entries                                        │
//! │        │                                                     │
//! │        ▼                                                     │
//! │  ┌─────────────────────┐  exhausted   ┌──────────────────┐   │
//! │  │ ExponentialBackoff  │─────────────▶│  MemoryFallback  │   │
//! │  │  over the backend   │              │ (using_fallback) │   │
//! │  └──────────┬──────────┘              └────────┬─────────┘   │
//! │             ▼                                  │             │
//! │  ┌─────────────────────┐   resync_fallback()   │             │
//! │  │  RegisterBackend    │◀──────────────────────┘             │
//! │  │  (SQLite)           │                                     │
//! │  └─────────────────────┘                                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Once the fallback is active, values written to it shadow the durable
//! backend until an explicit [`PersistentRegisterStore::resync_fallback`]
//! moves them back. A later durable write to the same address evicts the
//! shadowing entry, so the newest accepted write always wins.
//!
//! Every value the store accepts or reads is also kept in a [`ValueMirror`].
//! When the backend cannot answer a read, the mirror does, so addresses
//! written before an outage keep their last value. Only addresses the store
//! has never seen fall back to the default.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use neasmart_core::error::{StoreError, StoreResult};
use neasmart_core::retry::{ExponentialBackoff, RetryOutcome, RetryStrategy};
use neasmart_core::types::{RegisterEntry, WriteSource};

use crate::memory::{MemoryFallback, ValueMirror};
use crate::sqlite::SqliteBackend;
use crate::traits::{RegisterBackend, StoreConfig, StoreStatus};

// =============================================================================
// PersistentRegisterStore
// =============================================================================

/// Durable address → value store that degrades to memory instead of failing.
///
/// # Thread Safety
///
/// This struct is `Send + Sync`. Every operation holds the store lock for the
/// duration of its storage work, which serializes writes to the same address.
pub struct PersistentRegisterStore {
    backend: Option<Arc<dyn RegisterBackend>>,
    backend_name: String,
    fallback: MemoryFallback,
    mirror: ValueMirror,
    config: StoreConfig,
    retry: ExponentialBackoff,
    lock: Mutex<()>,
    using_fallback: AtomicBool,
    healthy: AtomicBool,
    last_error: parking_lot::Mutex<Option<String>>,
}

impl PersistentRegisterStore {
    /// Creates a store over an existing backend.
    pub fn new(backend: Arc<dyn RegisterBackend>, config: StoreConfig) -> Self {
        let backend_name = backend.name().to_string();
        Self {
            backend: Some(backend),
            backend_name,
            fallback: MemoryFallback::new(),
            mirror: ValueMirror::new(),
            retry: ExponentialBackoff::new(config.retry.clone()),
            config,
            lock: Mutex::new(()),
            using_fallback: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            last_error: parking_lot::Mutex::new(None),
        }
    }

    /// Opens the SQLite database named by `config.path`.
    ///
    /// If the database cannot be opened and the fallback is enabled, the
    /// store starts in fallback mode without a durable backend.
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        match SqliteBackend::open(&config.path).await {
            Ok(backend) => Ok(Self::new(Arc::new(backend), config)),
            Err(e) if config.enable_fallback => {
                warn!(
                    path = %config.path.display(),
                    error = %e,
                    "Register database unavailable, starting on in-memory fallback"
                );
                Ok(Self::detached(config, &e))
            }
            Err(e) => Err(e),
        }
    }

    fn detached(config: StoreConfig, error: &StoreError) -> Self {
        Self {
            backend: None,
            backend_name: "sqlite".to_string(),
            fallback: MemoryFallback::new(),
            mirror: ValueMirror::new(),
            retry: ExponentialBackoff::new(config.retry.clone()),
            config,
            lock: Mutex::new(()),
            using_fallback: AtomicBool::new(true),
            healthy: AtomicBool::new(false),
            last_error: parking_lot::Mutex::new(Some(error.to_string())),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns `true` while the fallback serves reads and writes.
    pub fn using_fallback(&self) -> bool {
        self.using_fallback.load(Ordering::SeqCst)
    }

    /// Number of entries waiting in the fallback.
    pub fn fallback_len(&self) -> usize {
        self.fallback.len()
    }

    /// Returns the stored value, or `default_value` if never written.
    pub async fn get(&self, address: u16) -> StoreResult<u16> {
        let _guard = self.lock.lock().await;

        if self.using_fallback() {
            if let Some(value) = self.fallback.value(address) {
                return Ok(value);
            }
        }

        match self
            .run("get", move |backend| async move { backend.get(address).await })
            .await
        {
            Ok(Some(value)) => {
                self.mirror.record(address, value);
                Ok(value)
            }
            Ok(None) => Ok(self.config.default_value),
            Err(StoreError::Corrupt { address, message }) => {
                warn!(address, message = %message, "Corrupt register value, serving default");
                self.mirror.forget(address);
                Ok(self.config.default_value)
            }
            Err(e) => {
                self.degrade("get", &e)?;
                Ok(self
                    .mirror
                    .get(address)
                    .unwrap_or(self.config.default_value))
            }
        }
    }

    /// Stores `value` at `address`.
    ///
    /// Redirects to the fallback once the backend retries are exhausted.
    pub async fn set(&self, address: u16, value: u16, source: WriteSource) -> StoreResult<()> {
        let entry = RegisterEntry::new(address, value, source);
        let _guard = self.lock.lock().await;

        let durable = entry.clone();
        let result = self
            .run("set", move |backend| {
                let entry = durable.clone();
                async move { backend.set(&entry).await }
            })
            .await;

        match result {
            Ok(()) => {
                if self.using_fallback() {
                    self.fallback.remove(address);
                }
                self.mirror.record(address, value);
                Ok(())
            }
            Err(e) => {
                self.degrade("set", &e)?;
                debug!(address, value, source = %source, "Register write kept in fallback");
                self.fallback.insert(entry);
                self.mirror.record(address, value);
                Ok(())
            }
        }
    }

    /// Every known entry, fallback entries shadowing durable ones.
    pub async fn entries(&self) -> StoreResult<Vec<RegisterEntry>> {
        let _guard = self.lock.lock().await;
        let mut merged = BTreeMap::new();

        match self
            .run("entries", |backend| async move { backend.entries().await })
            .await
        {
            Ok(entries) => {
                self.mirror.record_all(&entries);
                for entry in entries {
                    merged.insert(entry.address, entry);
                }
            }
            Err(e) => self.degrade("entries", &e)?,
        }

        for entry in self.fallback.snapshot() {
            merged.insert(entry.address, entry);
        }
        Ok(merged.into_values().collect())
    }

    /// Checks the durable backend.
    ///
    /// A successful check marks the store healthy but leaves the fallback
    /// and its contents untouched.
    pub async fn health_check(&self) -> StoreStatus {
        let _guard = self.lock.lock().await;

        let healthy = match &self.backend {
            Some(backend) => match backend.ping().await {
                Ok(()) => true,
                Err(e) => {
                    *self.last_error.lock() = Some(e.to_string());
                    false
                }
            },
            None => false,
        };
        self.healthy.store(healthy, Ordering::SeqCst);
        self.status()
    }

    /// Current status without probing the backend.
    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            healthy: self.healthy.load(Ordering::SeqCst),
            using_fallback: self.using_fallback(),
            backend: self.backend_name.clone(),
            fallback_entries: self.fallback.len(),
            last_error: self.last_error.lock().clone(),
        }
    }

    /// Moves every fallback entry into the durable backend.
    ///
    /// Each entry goes through the retry policy on its own. The fallback flag
    /// is cleared only once the fallback is empty. Returns the number of
    /// entries moved; fails only if entries were pending and none moved.
    pub async fn resync_fallback(&self) -> StoreResult<usize> {
        let _guard = self.lock.lock().await;
        let pending = self.fallback.snapshot();
        let total = pending.len();

        let mut moved = 0;
        let mut last_failure = None;
        for entry in pending {
            let address = entry.address;
            let result = self
                .run("resync", move |backend| {
                    let entry = entry.clone();
                    async move { backend.set(&entry).await }
                })
                .await;

            match result {
                Ok(()) => {
                    self.fallback.remove(address);
                    moved += 1;
                }
                Err(e) => {
                    warn!(address, error = %e, "Fallback entry could not be resynchronized");
                    last_failure = Some(e);
                }
            }
        }

        if self.fallback.is_empty() {
            if self.using_fallback.swap(false, Ordering::SeqCst) {
                info!(
                    backend = %self.backend_name,
                    moved,
                    "Fallback entries resynchronized, durable backend resumed"
                );
            }
            self.healthy.store(true, Ordering::SeqCst);
            return Ok(moved);
        }

        let remaining = self.fallback.len();
        warn!(moved, remaining, total, "Fallback resync incomplete");
        match last_failure {
            Some(e) if moved == 0 => {
                *self.last_error.lock() = Some(e.to_string());
                Err(StoreError::unavailable(format!(
                    "resync moved none of {remaining} fallback entries: {e}"
                )))
            }
            _ => Ok(moved),
        }
    }

    /// Runs `operation` against the durable backend through the retry policy.
    async fn run<T, F, Fut>(&self, label: &'static str, mut operation: F) -> StoreResult<T>
    where
        F: FnMut(Arc<dyn RegisterBackend>) -> Fut + Send,
        Fut: Future<Output = StoreResult<T>> + Send,
        T: Send,
    {
        let Some(backend) = self.backend.clone() else {
            return Err(StoreError::unavailable("no durable backend"));
        };

        let outcome = self
            .retry
            .execute(label, || operation(backend.clone()), StoreError::is_retryable)
            .await;

        match outcome {
            RetryOutcome::Success { value, attempts } => {
                if attempts > 1 {
                    debug!(operation = label, attempts, "Store operation recovered after retry");
                }
                Ok(value)
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                if last_error.is_retryable() {
                    warn!(
                        backend = %self.backend_name,
                        operation = label,
                        attempts,
                        error = %last_error,
                        "Store retries exhausted"
                    );
                }
                Err(last_error)
            }
        }
    }

    /// Records a backend failure and activates the fallback if allowed.
    fn degrade(&self, operation: &str, error: &StoreError) -> StoreResult<()> {
        *self.last_error.lock() = Some(error.to_string());
        self.healthy.store(false, Ordering::SeqCst);

        if !self.config.enable_fallback {
            return Err(StoreError::unavailable(format!(
                "{operation} failed with fallback disabled: {error}"
            )));
        }

        if !self.using_fallback.swap(true, Ordering::SeqCst) {
            warn!(
                backend = %self.backend_name,
                operation,
                error = %error,
                "Register store switched to in-memory fallback"
            );
        }
        Ok(())
    }
}

impl fmt::Debug for PersistentRegisterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentRegisterStore")
            .field("backend", &self.backend_name)
            .field("using_fallback", &self.using_fallback())
            .field("fallback_entries", &self.fallback.len())
            .finish()
    }
}

/// A register store shared between tasks.
pub type SharedRegisterStore = Arc<PersistentRegisterStore>;

// =============================================================================
// Tests
// =============================================================================
