// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! Mock implementations for testing gateway components in isolation.
//!
//! - [`ScriptedBus`]: a register bus with per-address failures and an
//!   on/off switch for the whole bus
//! - [`FailingBackend`]: a store backend that fails on demand

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use neasmart_core::error::{BusError, BusResult, StoreError, StoreResult};
use neasmart_core::types::{RegisterEntry, SlaveId};
use neasmart_modbus::RegisterBus;
use neasmart_store::{MemoryFallback, RegisterBackend};

// =============================================================================
// ScriptedBus
// =============================================================================

/// A register bus whose answers are scripted by the test.
#[derive(Debug, Default)]
pub struct ScriptedBus {
    /// Register values keyed by address. Unknown addresses read as 0.
    values: Mutex<HashMap<u16, u16>>,

    /// Addresses answering with an IllegalDataAddress exception.
    broken: Mutex<HashSet<u16>>,

    /// When set, every call fails with `NotConnected`.
    down: AtomicBool,

    /// Simulated latency per call.
    latency: Mutex<Option<Duration>>,

    /// Read call count for verification.
    read_count: AtomicU64,

    /// Write call count for verification.
    write_count: AtomicU64,
}

impl ScriptedBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus preloaded with `values`.
    pub fn with_values(values: impl IntoIterator<Item = (u16, u16)>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Sets a register value on the device side.
    pub fn set_value(&self, address: u16, value: u16) {
        self.values.lock().insert(address, value);
    }

    /// Returns the device-side value of a register.
    pub fn value(&self, address: u16) -> Option<u16> {
        self.values.lock().get(&address).copied()
    }

    /// Makes `address` answer with a Modbus exception.
    pub fn break_address(&self, address: u16) {
        self.broken.lock().insert(address);
    }

    /// Takes the whole bus down or brings it back.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Adds latency to every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of read calls received.
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Number of write calls received.
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RegisterBus for ScriptedBus {
    async fn read_holding_registers(
        &self,
        _slave: SlaveId,
        address: u16,
        count: u16,
    ) -> BusResult<Vec<u16>> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.down.load(Ordering::SeqCst) {
            return Err(BusError::NotConnected);
        }

        let values = self.values.lock();
        let broken = self.broken.lock();
        (u32::from(address)..u32::from(address) + u32::from(count))
            .map(|a| {
                let a = a as u16;
                if broken.contains(&a) {
                    Err(BusError::Exception {
                        function: 0x03,
                        code: 0x02,
                    })
                } else {
                    Ok(values.get(&a).copied().unwrap_or(0))
                }
            })
            .collect()
    }

    async fn write_single_register(
        &self,
        _slave: SlaveId,
        address: u16,
        value: u16,
    ) -> BusResult<()> {
        self.write_count.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.down.load(Ordering::SeqCst) {
            return Err(BusError::NotConnected);
        }
        self.values.lock().insert(address, value);
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// =============================================================================
// FailingBackend
// =============================================================================

/// A store backend that delegates to memory and fails on demand.
#[derive(Debug, Default)]
pub struct FailingBackend {
    inner: MemoryFallback,

    /// Fail every operation while set.
    fail_all: AtomicBool,

    /// Fail this many upcoming operations, then recover.
    fail_next: AtomicU32,

    /// Operation count for verification.
    call_count: AtomicU64,
}

impl FailingBackend {
    /// Creates a healthy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that fails every operation.
    pub fn broken() -> Self {
        let backend = Self::default();
        backend.set_failing(true);
        backend
    }

    /// Fails every operation while `failing` is set.
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// Fails the next `count` operations.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Number of backend operations attempted.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Value held durably at `address`.
    pub fn durable_value(&self, address: u16) -> Option<u16> {
        self.inner.value(address)
    }

    /// Number of entries held durably.
    pub fn durable_len(&self) -> usize {
        self.inner.len()
    }

    fn check(&self, operation: &str) -> StoreResult<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(StoreError::database(operation, "database is locked"));
        }
        let consumed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(StoreError::database(operation, "disk I/O error"));
        }
        Ok(())
    }
}

#[async_trait]
impl RegisterBackend for FailingBackend {
    async fn get(&self, address: u16) -> StoreResult<Option<u16>> {
        self.check("get")?;
        Ok(self.inner.value(address))
    }

    async fn set(&self, entry: &RegisterEntry) -> StoreResult<()> {
        self.check("set")?;
        self.inner.insert(entry.clone());
        Ok(())
    }

    async fn entries(&self) -> StoreResult<Vec<RegisterEntry>> {
        self.check("entries")?;
        Ok(self.inner.snapshot())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check("ping")
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_bus() {
        let bus = ScriptedBus::with_values([(1, 10), (2, 20)]);
        let values = bus
            .read_holding_registers(SlaveId::default(), 1, 3)
            .await
            .unwrap();
        assert_eq!(values, vec![10, 20, 0]);

        bus.break_address(2);
        assert!(bus
            .read_holding_registers(SlaveId::default(), 1, 2)
            .await
            .is_err());

        bus.set_down(true);
        assert!(bus
            .write_single_register(SlaveId::default(), 1, 5)
            .await
            .is_err());
        assert_eq!(bus.read_count(), 2);
        assert_eq!(bus.write_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_backend_recovers_after_budget() {
        let backend = FailingBackend::new();
        backend.fail_next(2);

        assert!(backend.ping().await.is_err());
        assert!(backend.ping().await.is_err());
        assert!(backend.ping().await.is_ok());
        assert_eq!(backend.call_count(), 3);
    }
}
