// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Register manager.
//!
//! The manager is the single owner of the register context. Every register
//! access from the API, from batch sync or from the Neasmart master goes
//! through it:
//!
//! ```text
//!              read_register / write_register / batch_sync_from_bus
//!                                   │
//!                                   ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ModbusManager                            │
//! │                                                                  │
//! │   CircuitBreaker ──► RegisterBus      PersistentRegisterStore    │
//! │        │                 │                     ▲                 │
//! │        └── open/failed ──┴── cached value ─────┘                 │
//! │                                                                  │
//! │                       RegisterContext ◄── apply_remote_write     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bus trouble degrades to cached data instead of failing the caller. Only
//! validation errors and a store that cannot serve at all reach the caller.
//!
//! Commits to the store and the context are serialized by one commit lock
//! per manager. A value read from the bus is committed only if no local
//! write to that address started or finished while the read was on the
//! bus; otherwise the newer write stays in place.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use neasmart_core::circuit_breaker::{CircuitBreaker, CircuitState};
use neasmart_core::error::{BusError, StoreError, ValidationError};
use neasmart_core::types::{RegisterRange, SlaveId, ValueOrigin, WriteSource};
use neasmart_store::{SharedRegisterStore, StoreStatus};

use crate::bus::SharedBus;
use crate::context::RegisterContext;
use crate::error::{ManagerError, ManagerResult};
use crate::local::LocalBus;
use crate::types::{MAX_READ_COUNT, ManagerConfig};

// =============================================================================
// Results
// =============================================================================

/// Result of a single register read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRead {
    /// Register address.
    pub address: u16,
    /// Register value.
    pub value: u16,
    /// Whether the value came from the bus or the store.
    pub origin: ValueOrigin,
}

/// Result of a register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    /// Register address.
    pub address: u16,
    /// Value written.
    pub value: u16,
    /// `false` when the value was stored but the bus write failed or was
    /// short-circuited.
    pub bus_confirmed: bool,
}

/// Outcome of a batch synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Number of addresses requested.
    pub requested: usize,
    /// Number of addresses read and committed.
    pub synced: usize,
    /// Addresses that could not be synced, ascending.
    pub failed: Vec<u16>,
    /// When the sync started.
    pub started_at: DateTime<Utc>,
    /// When the sync finished.
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    /// Returns `true` if every requested address was synced.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.synced == self.requested
    }
}

/// Health view of the manager and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerHealth {
    /// Slave id served by this manager.
    pub slave_id: SlaveId,
    /// Breaker state guarding the bus.
    pub circuit_state: CircuitState,
    /// Consecutive bus failures counted by the breaker.
    pub consecutive_failures: u32,
    /// Whether the store is serving from its in-memory fallback.
    pub using_fallback: bool,
    /// Last batch sync that committed at least one register.
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    /// Store status after a backend check.
    pub store: StoreStatus,
    /// Bus name.
    pub bus: String,
}

impl ManagerHealth {
    /// Returns `true` if the breaker is not closed or the store is on its
    /// fallback.
    pub fn is_degraded(&self) -> bool {
        self.circuit_state != CircuitState::Closed || self.using_fallback
    }
}

// =============================================================================
// WriteLedger
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct WriteMark {
    epoch: u64,
    in_flight: usize,
}

/// Records when each address was last written locally.
#[derive(Debug, Default)]
struct WriteLedger {
    epoch: AtomicU64,
    marks: Mutex<HashMap<u16, WriteMark>>,
}

impl WriteLedger {
    /// Epoch a bus read started at.
    fn now(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn touch(&self, address: u16, in_flight: isize) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let mut marks = self.marks.lock();
        let mark = marks.entry(address).or_default();
        mark.epoch = epoch;
        mark.in_flight = mark.in_flight.saturating_add_signed(in_flight);
    }

    /// Records a completed write.
    fn mark(&self, address: u16) {
        self.touch(address, 0);
    }

    /// Records a write whose bus leg is still running.
    fn begin(&self, address: u16) -> InFlightWrite<'_> {
        self.touch(address, 1);
        InFlightWrite {
            ledger: self,
            address,
        }
    }

    /// Returns `true` if a read started at `started` is older than a write.
    fn superseded(&self, address: u16, started: u64) -> bool {
        self.marks
            .lock()
            .get(&address)
            .is_some_and(|mark| mark.in_flight > 0 || mark.epoch > started)
    }
}

/// Ends an in-flight write when dropped, including on cancellation.
struct InFlightWrite<'a> {
    ledger: &'a WriteLedger,
    address: u16,
}

impl Drop for InFlightWrite<'_> {
    fn drop(&mut self) {
        self.ledger.touch(self.address, -1);
    }
}

enum ReadCommit {
    Committed,
    Superseded,
    NotPersisted(StoreError),
}

// =============================================================================
// ModbusManager
// =============================================================================

/// Mediates every register read and write with fallback and persistence.
///
/// # Thread Safety
///
/// `Send + Sync`; share it behind an `Arc`. The commit lock is never held
/// across a bus call.
pub struct ModbusManager {
    config: ManagerConfig,
    store: SharedRegisterStore,
    bus: SharedBus,
    context: Arc<RegisterContext>,
    breaker: CircuitBreaker,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    commit: tokio::sync::Mutex<()>,
    ledger: WriteLedger,
}

impl ModbusManager {
    /// Creates a manager talking to `bus`, with a fresh register context.
    pub fn new(config: ManagerConfig, store: SharedRegisterStore, bus: SharedBus) -> Self {
        let context = Arc::new(RegisterContext::new(config.slave_id));
        Self::assemble(config, store, bus, context)
    }

    /// Creates a manager whose bus loops back to its own register context.
    pub fn local(config: ManagerConfig, store: SharedRegisterStore) -> Self {
        let context = Arc::new(RegisterContext::new(config.slave_id));
        let bus: SharedBus = Arc::new(LocalBus::new(context.clone()));
        Self::assemble(config, store, bus, context)
    }

    /// Creates a manager over an existing context.
    ///
    /// Fails if the context belongs to another slave.
    pub fn with_context(
        config: ManagerConfig,
        store: SharedRegisterStore,
        bus: SharedBus,
        context: Arc<RegisterContext>,
    ) -> ManagerResult<Self> {
        if context.slave_id() != config.slave_id {
            return Err(ValidationError::UnknownSlave {
                slave_id: context.slave_id().get(),
            }
            .into());
        }
        Ok(Self::assemble(config, store, bus, context))
    }

    fn assemble(
        config: ManagerConfig,
        store: SharedRegisterStore,
        bus: SharedBus,
        context: Arc<RegisterContext>,
    ) -> Self {
        let breaker = CircuitBreaker::new(
            format!("modbus-{}", bus.name()),
            config.circuit_breaker.clone(),
        );
        Self {
            config,
            store,
            bus,
            context,
            breaker,
            last_sync: Mutex::new(None),
            commit: tokio::sync::Mutex::new(()),
            ledger: WriteLedger::default(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Returns the slave id this manager serves.
    pub fn slave_id(&self) -> SlaveId {
        self.config.slave_id
    }

    /// Returns the register store.
    pub fn store(&self) -> &SharedRegisterStore {
        &self.store
    }

    /// Returns the register context.
    pub fn context(&self) -> &Arc<RegisterContext> {
        &self.context
    }

    /// Returns the breaker guarding the bus.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Returns the last successful batch sync time.
    pub fn last_sync_timestamp(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock()
    }

    fn check_slave(&self, slave_id: u8) -> ManagerResult<SlaveId> {
        if slave_id != self.config.slave_id.get() {
            return Err(ValidationError::UnknownSlave { slave_id }.into());
        }
        Ok(self.config.slave_id)
    }

    /// Reads one register, falling back to the stored value when the bus is
    /// unavailable.
    pub async fn read_register(&self, slave_id: u8, address: u16) -> ManagerResult<RegisterRead> {
        let slave = self.check_slave(slave_id)?;
        let started = self.ledger.now();

        let result = self
            .breaker
            .call(|| self.bus.read_holding_registers(slave, address, 1))
            .await
            .map_err(ManagerError::from)
            .and_then(|values| {
                values.first().copied().ok_or_else(|| {
                    BusError::invalid_response(format!("empty response for register {address}"))
                        .into()
                })
            });

        match result {
            Ok(value) => match self
                .commit_read(address, value, WriteSource::Bus, started)
                .await
            {
                ReadCommit::Superseded => {
                    debug!(address, value, "Live value superseded by a newer write");
                    Ok(RegisterRead {
                        address,
                        value: self.store.get(address).await?,
                        origin: ValueOrigin::Cached,
                    })
                }
                commit => {
                    if let ReadCommit::NotPersisted(e) = commit {
                        warn!(address, value, error = %e, "Failed to persist live register value");
                    }
                    Ok(RegisterRead {
                        address,
                        value,
                        origin: ValueOrigin::Live,
                    })
                }
            },
            Err(e) => {
                debug!(address, error = %e, error_type = e.error_type(), "Serving cached register value");
                let value = self.store.get(address).await?;
                Ok(RegisterRead {
                    address,
                    value,
                    origin: ValueOrigin::Cached,
                })
            }
        }
    }

    /// Writes one register.
    ///
    /// The store is written first, then the context, then the bus. A bus
    /// failure leaves the stored value in place and is reported through
    /// `bus_confirmed`.
    pub async fn write_register(
        &self,
        slave_id: u8,
        address: u16,
        value: u16,
    ) -> ManagerResult<WriteAck> {
        let slave = self.check_slave(slave_id)?;

        let _in_flight = {
            let _commit = self.commit.lock().await;
            self.store.set(address, value, WriteSource::Api).await?;
            self.context.set(address, value);
            self.ledger.begin(address)
        };

        let bus_confirmed = match self
            .breaker
            .call(|| self.bus.write_single_register(slave, address, value))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                let e = ManagerError::from(e);
                warn!(
                    address,
                    value,
                    bus = %self.bus.name(),
                    error = %e,
                    "Register stored but bus write failed"
                );
                false
            }
        };

        Ok(WriteAck {
            address,
            value,
            bus_confirmed,
        })
    }

    /// Reads `range` from the bus and commits every value read.
    ///
    /// Addresses are read in contiguous chunks of at most `sync_batch_size`
    /// registers. A failed chunk is retried one address at a time so only
    /// the addresses that really failed are reported.
    pub async fn batch_sync_from_bus(
        &self,
        slave_id: u8,
        range: &RegisterRange,
    ) -> ManagerResult<SyncReport> {
        let slave = self.check_slave(slave_id)?;
        range.validate()?;

        let started_at = Utc::now();
        let requested = range.len();
        let mut synced = 0;
        let mut failed = Vec::new();

        let batch_size = self.config.sync_batch_size.clamp(1, MAX_READ_COUNT);
        for (start, count) in range.chunks(batch_size) {
            let started = self.ledger.now();
            match self.read_block(slave, start, count).await {
                Ok(values) => {
                    for (offset, value) in values.into_iter().enumerate() {
                        let address = start + offset as u16;
                        if self.commit_synced(address, value, started).await {
                            synced += 1;
                        } else {
                            failed.push(address);
                        }
                    }
                }
                Err(e) if count > 1 => {
                    debug!(start, count, error = %e, "Chunk read failed, retrying per address");
                    let end = u32::from(start) + u32::from(count);
                    for address in (u32::from(start)..end).filter_map(|a| u16::try_from(a).ok()) {
                        let started = self.ledger.now();
                        match self.read_block(slave, address, 1).await {
                            Ok(values) => {
                                let committed = match values.first() {
                                    Some(&value) => {
                                        self.commit_synced(address, value, started).await
                                    }
                                    None => false,
                                };
                                if committed {
                                    synced += 1;
                                } else {
                                    failed.push(address);
                                }
                            }
                            Err(_) => failed.push(address),
                        }
                    }
                }
                Err(_) => failed.push(start),
            }
        }

        let finished_at = Utc::now();
        if synced > 0 {
            *self.last_sync.lock() = Some(finished_at);
        }

        let report = SyncReport {
            requested,
            synced,
            failed,
            started_at,
            finished_at,
        };

        if report.is_complete() {
            info!(
                requested = report.requested,
                synced = report.synced,
                "Batch sync completed"
            );
        } else {
            warn!(
                requested = report.requested,
                synced = report.synced,
                failed = report.failed.len(),
                circuit_state = %self.breaker.state(),
                "Batch sync partially failed"
            );
        }
        Ok(report)
    }

    async fn read_block(&self, slave: SlaveId, start: u16, count: u16) -> ManagerResult<Vec<u16>> {
        let values = self
            .breaker
            .call(|| self.bus.read_holding_registers(slave, start, count))
            .await?;
        if values.len() != usize::from(count) {
            return Err(BusError::invalid_response(format!(
                "expected {count} registers at {start}, got {}",
                values.len()
            ))
            .into());
        }
        Ok(values)
    }

    /// Commits a synced value. A value superseded by a newer local write
    /// counts as synced: the store already holds something newer.
    async fn commit_synced(&self, address: u16, value: u16, started: u64) -> bool {
        match self
            .commit_read(address, value, WriteSource::Sync, started)
            .await
        {
            ReadCommit::Committed => true,
            ReadCommit::Superseded => {
                debug!(address, value, "Synced value superseded by a newer write");
                true
            }
            ReadCommit::NotPersisted(e) => {
                warn!(address, value, error = %e, "Failed to persist synced register");
                false
            }
        }
    }

    /// Commits a value read from the bus at epoch `started`.
    async fn commit_read(
        &self,
        address: u16,
        value: u16,
        source: WriteSource,
        started: u64,
    ) -> ReadCommit {
        let _commit = self.commit.lock().await;
        if self.ledger.superseded(address, started) {
            return ReadCommit::Superseded;
        }

        self.context.set(address, value);
        match self.store.set(address, value, source).await {
            Ok(()) => ReadCommit::Committed,
            Err(e) => ReadCommit::NotPersisted(e),
        }
    }

    /// Applies a write received from the Neasmart master.
    ///
    /// Values are persisted and applied to the context; nothing is sent to
    /// the bus.
    pub async fn apply_remote_write(&self, address: u16, values: &[u16]) -> ManagerResult<()> {
        let end = u32::from(address) + values.len() as u32;
        if values.is_empty() || end > u32::from(u16::MAX) + 1 {
            return Err(ValidationError::InvalidRange {
                start: u32::from(address),
                count: values.len() as u32,
            }
            .into());
        }

        let _commit = self.commit.lock().await;
        for (offset, &value) in values.iter().enumerate() {
            let target = address + offset as u16;
            self.store.set(target, value, WriteSource::Remote).await?;
            self.context.set(target, value);
            self.ledger.mark(target);
        }

        debug!(address, count = values.len(), "Applied remote register write");
        Ok(())
    }

    /// Seeds the register context from the store. Returns the number of
    /// registers loaded.
    pub async fn restore_context(&self) -> ManagerResult<usize> {
        let entries = self.store.entries().await?;
        let loaded = self.context.load(&entries);
        info!(
            slave_id = %self.config.slave_id,
            registers = loaded,
            using_fallback = self.store.using_fallback(),
            "Register context restored"
        );
        Ok(loaded)
    }

    /// Returns the current health, probing the store backend.
    pub async fn health(&self) -> ManagerHealth {
        let store = self.store.health_check().await;
        let snapshot = self.breaker.snapshot();

        ManagerHealth {
            slave_id: self.config.slave_id,
            circuit_state: snapshot.state,
            consecutive_failures: snapshot.consecutive_failures,
            using_fallback: store.using_fallback,
            last_sync_timestamp: self.last_sync_timestamp(),
            store,
            bus: self.bus.name().to_string(),
        }
    }
}

impl std::fmt::Debug for ModbusManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusManager")
            .field("slave_id", &self.config.slave_id)
            .field("bus", &self.bus.name())
            .field("circuit_state", &self.breaker.state())
            .field("registers", &self.context.len())
            .finish()
    }
}

/// A manager shared between the API, the Modbus server and the runtime.
pub type SharedManager = Arc<ModbusManager>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use neasmart_core::circuit_breaker::CircuitBreakerConfig;
    use neasmart_core::error::BusResult;
    use neasmart_core::retry::RetryConfig;
    use neasmart_store::{MemoryFallback, PersistentRegisterStore, StoreConfig};

    use crate::bus::RegisterBus;

    #[derive(Debug, Default)]
    struct ScriptedBus {
        values: parking_lot::Mutex<HashMap<u16, u16>>,
        broken: HashSet<u16>,
        down: AtomicBool,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl ScriptedBus {
        fn with_values(values: impl IntoIterator<Item = (u16, u16)>) -> Self {
            Self {
                values: parking_lot::Mutex::new(values.into_iter().collect()),
                ..Self::default()
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
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(BusError::NotConnected);
            }
            let values = self.values.lock();
            (u32::from(address)..u32::from(address) + u32::from(count))
                .map(|a| a as u16)
                .map(|a| {
                    if self.broken.contains(&a) {
                        Err(BusError::Exception { function: 3, code: 2 })
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
            self.writes.fetch_add(1, Ordering::SeqCst);
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

    /// Takes its snapshot when the request is issued and answers later.
    #[derive(Debug, Default)]
    struct SlowReadBus {
        values: parking_lot::Mutex<HashMap<u16, u16>>,
    }

    #[async_trait]
    impl RegisterBus for SlowReadBus {
        async fn read_holding_registers(
            &self,
            _slave: SlaveId,
            address: u16,
            count: u16,
        ) -> BusResult<Vec<u16>> {
            let snapshot: Vec<u16> = {
                let values = self.values.lock();
                (u32::from(address)..u32::from(address) + u32::from(count))
                    .map(|a| values.get(&(a as u16)).copied().unwrap_or(0))
                    .collect()
            };
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(snapshot)
        }

        async fn write_single_register(
            &self,
            _slave: SlaveId,
            address: u16,
            value: u16,
        ) -> BusResult<()> {
            self.values.lock().insert(address, value);
            Ok(())
        }

        fn name(&self) -> &str {
            "slow-read"
        }
    }

    const SLAVE: u8 = 240;

    fn store() -> SharedRegisterStore {
        let config = StoreConfig::builder().retry(RetryConfig::immediate(2)).build();
        Arc::new(PersistentRegisterStore::new(
            Arc::new(MemoryFallback::new()),
            config,
        ))
    }

    fn config() -> ManagerConfig {
        ManagerConfig::default().with_circuit_breaker(
            CircuitBreakerConfig::builder()
                .failure_threshold(2)
                .recovery_timeout(Duration::from_secs(60))
                .call_timeout(None)
                .build(),
        )
    }

    fn manager(bus: Arc<ScriptedBus>) -> ModbusManager {
        ModbusManager::new(config(), store(), bus)
    }

    #[tokio::test]
    async fn test_read_live_value_is_persisted() {
        let bus = Arc::new(ScriptedBus::with_values([(10, 215)]));
        let manager = manager(bus);

        let read = manager.read_register(SLAVE, 10).await.unwrap();
        assert_eq!(read.value, 215);
        assert_eq!(read.origin, ValueOrigin::Live);
        assert_eq!(manager.store().get(10).await.unwrap(), 215);
        assert_eq!(manager.context().get(10), Some(215));
    }

    #[tokio::test]
    async fn test_read_falls_back_to_cache() {
        let bus = Arc::new(ScriptedBus::default());
        let manager = manager(bus.clone());
        manager.write_register(SLAVE, 7, 42).await.unwrap();

        bus.down.store(true, Ordering::SeqCst);
        let read = manager.read_register(SLAVE, 7).await.unwrap();
        assert_eq!(read.value, 42);
        assert!(read.origin.is_cached());
    }

    #[tokio::test]
    async fn test_write_survives_bus_failure() {
        let bus = Arc::new(ScriptedBus::default());
        bus.down.store(true, Ordering::SeqCst);
        let manager = manager(bus);

        let ack = manager.write_register(SLAVE, 3, 99).await.unwrap();
        assert!(!ack.bus_confirmed);
        assert_eq!(manager.store().get(3).await.unwrap(), 99);
        assert_eq!(manager.context().get(3), Some(99));
    }

    #[tokio::test]
    async fn test_repeated_failures_open_breaker() {
        let bus = Arc::new(ScriptedBus::default());
        bus.down.store(true, Ordering::SeqCst);
        let manager = manager(bus.clone());

        for _ in 0..2 {
            manager.read_register(SLAVE, 1).await.unwrap();
        }
        let health = manager.health().await;
        assert_eq!(health.circuit_state, CircuitState::Open);
        assert!(health.is_degraded());

        // Short-circuited: the bus is not called again.
        let reads_before = bus.reads.load(Ordering::SeqCst);
        let read = manager.read_register(SLAVE, 1).await.unwrap();
        assert!(read.origin.is_cached());
        assert_eq!(bus.reads.load(Ordering::SeqCst), reads_before);
    }

    #[tokio::test]
    async fn test_unknown_slave_rejected() {
        let manager = manager(Arc::new(ScriptedBus::default()));

        let err = manager.read_register(1, 0).await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Validation(ValidationError::UnknownSlave { slave_id: 1 })
        ));
        assert!(manager.write_register(241, 0, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_batch_sync_reports_only_failed_addresses() {
        let mut bus = ScriptedBus::with_values((0..10).map(|a| (a, a * 10)));
        bus.broken.insert(4);
        let manager = manager(Arc::new(bus));

        let range = RegisterRange::contiguous(0, 10).unwrap();
        let report = manager.batch_sync_from_bus(SLAVE, &range).await.unwrap();

        assert_eq!(report.requested, 10);
        assert_eq!(report.synced, 9);
        assert_eq!(report.failed, vec![4]);
        assert!(!report.is_complete());
        assert_eq!(manager.store().get(9).await.unwrap(), 90);
        assert!(manager.last_sync_timestamp().is_some());
    }

    #[tokio::test]
    async fn test_batch_sync_chunks_reads() {
        let bus = Arc::new(ScriptedBus::with_values((0..250).map(|a| (a, a))));
        let manager = ModbusManager::new(config().with_sync_batch_size(100), store(), bus.clone());

        let range = RegisterRange::contiguous(0, 250).unwrap();
        let report = manager.batch_sync_from_bus(SLAVE, &range).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(bus.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_batch_sync_caps_oversized_batch() {
        let bus = Arc::new(ScriptedBus::with_values((0..250).map(|a| (a, a))));
        let config = ManagerConfig {
            sync_batch_size: 500,
            ..config()
        };
        let manager = ModbusManager::new(config, store(), bus.clone());

        let range = RegisterRange::contiguous(0, 250).unwrap();
        let report = manager.batch_sync_from_bus(SLAVE, &range).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(bus.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_batch_sync_whole_address_space() {
        let bus = Arc::new(ScriptedBus::with_values([(0, 1), (40_000, 4), (65_535, 9)]));
        let manager = ModbusManager::new(config().with_sync_batch_size(125), store(), bus.clone());

        let report = manager
            .batch_sync_from_bus(SLAVE, &RegisterRange::all())
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.synced, 65_536);
        assert_eq!(bus.reads.load(Ordering::SeqCst), 525);
        assert_eq!(manager.store().get(65_535).await.unwrap(), 9);
        assert_eq!(manager.context().get(40_000), Some(4));
    }

    #[tokio::test]
    async fn test_batch_sync_with_bus_down_leaves_timestamp_unset() {
        let bus = Arc::new(ScriptedBus::default());
        bus.down.store(true, Ordering::SeqCst);
        let manager = manager(bus);

        let range = RegisterRange::addresses([1, 2, 5]).unwrap();
        let report = manager.batch_sync_from_bus(SLAVE, &range).await.unwrap();

        assert_eq!(report.synced, 0);
        assert_eq!(report.failed, vec![1, 2, 5]);
        assert!(manager.last_sync_timestamp().is_none());
    }

    #[tokio::test]
    async fn test_batch_sync_rejects_invalid_range() {
        let manager = manager(Arc::new(ScriptedBus::default()));
        let range = RegisterRange::Contiguous {
            start: 65_530,
            count: 10,
        };

        let err = manager.batch_sync_from_bus(SLAVE, &range).await.unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Validation(ValidationError::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_slow_read_does_not_overwrite_newer_write() {
        let bus = Arc::new(SlowReadBus::default());
        let manager = Arc::new(ModbusManager::new(config(), store(), bus.clone()));

        let reader = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.read_register(SLAVE, 1).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let ack = manager.write_register(SLAVE, 1, 500).await.unwrap();
        assert!(ack.bus_confirmed);

        let read = reader.await.unwrap().unwrap();
        assert_eq!(read.value, 500);
        assert_eq!(read.origin, ValueOrigin::Cached);
        assert_eq!(manager.store().get(1).await.unwrap(), 500);
        assert_eq!(manager.context().get(1), Some(500));

        // A read issued after the write commits normally.
        let read = manager.read_register(SLAVE, 1).await.unwrap();
        assert_eq!((read.value, read.origin), (500, ValueOrigin::Live));
    }

    #[tokio::test]
    async fn test_slow_sync_keeps_write_made_during_read() {
        let bus = Arc::new(SlowReadBus::default());
        bus.values.lock().extend([(0, 10), (1, 11), (2, 12)]);
        let manager = Arc::new(ModbusManager::new(config(), store(), bus.clone()));

        let sync = {
            let manager = manager.clone();
            tokio::spawn(async move {
                let range = RegisterRange::contiguous(0, 3).unwrap();
                manager.batch_sync_from_bus(SLAVE, &range).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.apply_remote_write(1, &[2150]).await.unwrap();

        let report = sync.await.unwrap().unwrap();
        assert!(report.is_complete());
        assert_eq!(manager.store().get(0).await.unwrap(), 10);
        assert_eq!(manager.store().get(1).await.unwrap(), 2150);
        assert_eq!(manager.context().get(1), Some(2150));
    }

    #[tokio::test]
    async fn test_remote_write_does_not_touch_bus() {
        let bus = Arc::new(ScriptedBus::default());
        let manager = manager(bus.clone());

        manager.apply_remote_write(20, &[1, 2, 3]).await.unwrap();
        assert_eq!(manager.context().read(20, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(manager.store().get(22).await.unwrap(), 3);
        assert_eq!(bus.writes.load(Ordering::SeqCst), 0);

        assert!(manager.apply_remote_write(65_535, &[1, 2]).await.is_err());
        assert!(manager.apply_remote_write(0, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_restore_context_from_store() {
        let store = store();
        store.set(5, 55, WriteSource::Api).await.unwrap();
        store.set(6, 66, WriteSource::Sync).await.unwrap();

        let manager = ModbusManager::local(config(), store);
        assert_eq!(manager.restore_context().await.unwrap(), 2);
        assert_eq!(manager.context().get(6), Some(66));

        // The local bus sees the restored image.
        let read = manager.read_register(SLAVE, 5).await.unwrap();
        assert_eq!(read.value, 55);
        assert_eq!(read.origin, ValueOrigin::Live);
    }

    #[test]
    fn test_with_context_rejects_foreign_slave() {
        let context = Arc::new(RegisterContext::new(SlaveId::new(1).unwrap()));
        let result = ModbusManager::with_context(
            config(),
            store(),
            Arc::new(ScriptedBus::default()),
            context,
        );
        assert!(result.is_err());
    }
}
