// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory register medium.
//!
//! Used by the [`PersistentRegisterStore`] as its fallback when the durable
//! backend is exhausted, and usable on its own as a volatile backend.
//!
//! # Features
//!
//! - **Thread-Safe**: Uses `parking_lot::RwLock` for minimal contention
//! - **Last Write Wins**: Each address keeps only its newest entry
//! - **No Persistence**: Data is lost when the fallback is dropped
//!
//! [`PersistentRegisterStore`]: crate::PersistentRegisterStore

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use neasmart_core::error::StoreResult;
use neasmart_core::types::RegisterEntry;

use crate::traits::RegisterBackend;

/// A volatile address → entry map.
#[derive(Debug, Default)]
pub struct MemoryFallback {
    entries: RwLock<HashMap<u16, RegisterEntry>>,
}

impl MemoryFallback {
    /// Creates an empty fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored for `address`.
    pub fn value(&self, address: u16) -> Option<u16> {
        self.entries.read().get(&address).map(|e| e.value)
    }

    /// Returns the entry stored for `address`.
    pub fn entry(&self, address: u16) -> Option<RegisterEntry> {
        self.entries.read().get(&address).cloned()
    }

    /// Stores `entry`, replacing any previous entry for the address.
    pub fn insert(&self, entry: RegisterEntry) {
        self.entries.write().insert(entry.address, entry);
    }

    /// Removes the entry for `address`.
    pub fn remove(&self, address: u16) -> Option<RegisterEntry> {
        self.entries.write().remove(&address)
    }

    /// Returns a copy of every entry in ascending address order.
    pub fn snapshot(&self) -> Vec<RegisterEntry> {
        let mut entries: Vec<RegisterEntry> = self.entries.read().values().cloned().collect();
        entries.sort_by_key(|e| e.address);
        entries
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

// =============================================================================
// ValueMirror
// =============================================================================

/// Last value the store accepted or read for each address.
///
/// Serves reads while the durable backend is unreachable. Unlike the
/// fallback, nothing in the mirror is ever written back.
#[derive(Debug, Default)]
pub struct ValueMirror {
    values: RwLock<HashMap<u16, u16>>,
}

impl ValueMirror {
    /// Creates an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mirrored value for `address`.
    pub fn get(&self, address: u16) -> Option<u16> {
        self.values.read().get(&address).copied()
    }

    /// Records `value` as the newest value of `address`.
    pub fn record(&self, address: u16, value: u16) {
        self.values.write().insert(address, value);
    }

    /// Records every entry.
    pub fn record_all<'a>(&self, entries: impl IntoIterator<Item = &'a RegisterEntry>) {
        let mut values = self.values.write();
        for entry in entries {
            values.insert(entry.address, entry.value);
        }
    }

    /// Forgets `address`.
    pub fn forget(&self, address: u16) {
        self.values.write().remove(&address);
    }

    /// Number of mirrored addresses.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns `true` if nothing is mirrored.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

#[async_trait]
impl RegisterBackend for MemoryFallback {
    async fn get(&self, address: u16) -> StoreResult<Option<u16>> {
        Ok(self.value(address))
    }

    async fn set(&self, entry: &RegisterEntry) -> StoreResult<()> {
        self.insert(entry.clone());
        Ok(())
    }

    async fn entries(&self) -> StoreResult<Vec<RegisterEntry>> {
        Ok(self.snapshot())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use neasmart_core::types::WriteSource;
    use std::sync::Arc;

    #[test]
    fn test_insert_and_value() {
        let fallback = MemoryFallback::new();
        assert!(fallback.is_empty());

        fallback.insert(RegisterEntry::new(10, 1, WriteSource::Api));
        fallback.insert(RegisterEntry::new(10, 2, WriteSource::Bus));

        assert_eq!(fallback.value(10), Some(2));
        assert_eq!(fallback.entry(10).unwrap().source, WriteSource::Bus);
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback.value(11), None);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let fallback = MemoryFallback::new();
        for address in [30, 10, 20] {
            fallback.insert(RegisterEntry::new(address, address, WriteSource::Api));
        }
        let addresses: Vec<u16> = fallback.snapshot().iter().map(|e| e.address).collect();
        assert_eq!(addresses, vec![10, 20, 30]);
    }

    #[test]
    fn test_remove_and_clear() {
        let fallback = MemoryFallback::new();
        fallback.insert(RegisterEntry::new(1, 1, WriteSource::Api));
        fallback.insert(RegisterEntry::new(2, 2, WriteSource::Api));

        assert_eq!(fallback.remove(1).map(|e| e.value), Some(1));
        assert_eq!(fallback.len(), 1);

        fallback.clear();
        assert!(fallback.is_empty());
    }

    #[tokio::test]
    async fn test_backend_trait() {
        let fallback = MemoryFallback::new();
        fallback
            .set(&RegisterEntry::new(5, 99, WriteSource::Sync))
            .await
            .unwrap();

        assert_eq!(fallback.get(5).await.unwrap(), Some(99));
        assert_eq!(fallback.get(6).await.unwrap(), None);
        assert_eq!(fallback.entries().await.unwrap().len(), 1);
        assert!(fallback.ping().await.is_ok());
        assert_eq!(fallback.name(), "memory");
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let fallback = Arc::new(MemoryFallback::new());
        let mut handles = Vec::new();

        for task in 0..10u16 {
            let fallback = fallback.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10u16 {
                    fallback.insert(RegisterEntry::new(task * 10 + i, i, WriteSource::Api));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(fallback.len(), 100);
    }

    #[test]
    fn test_mirror_keeps_newest_value() {
        let mirror = ValueMirror::new();
        assert!(mirror.is_empty());

        mirror.record(4, 10);
        mirror.record(4, 11);
        mirror.record_all(&[
            RegisterEntry::new(5, 50, WriteSource::Sync),
            RegisterEntry::new(6, 60, WriteSource::Remote),
        ]);

        assert_eq!(mirror.get(4), Some(11));
        assert_eq!(mirror.get(6), Some(60));
        assert_eq!(mirror.len(), 3);

        mirror.forget(4);
        assert_eq!(mirror.get(4), None);
    }
}
