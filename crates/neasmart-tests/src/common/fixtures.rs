// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built stores, managers and configurations so each test starts from
//! the same known state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use neasmart_config::NeasmartConfig;
use neasmart_core::circuit_breaker::CircuitBreakerConfig;
use neasmart_core::retry::RetryConfig;
use neasmart_modbus::{ManagerConfig, ModbusManager, SharedManager};
use neasmart_store::{
    MemoryFallback, PersistentRegisterStore, RegisterBackend, SharedRegisterStore, StoreConfig,
};

use super::mocks::ScriptedBus;

/// Slave id used throughout the tests.
pub const TEST_SLAVE: u8 = 240;

// =============================================================================
// Temperature Fixtures
// =============================================================================

/// Known DPT 9.001 encodings as the Neasmart puts them on the wire.
pub struct TemperatureFixtures;

impl TemperatureFixtures {
    /// `(celsius, register word)` pairs.
    pub fn known_words() -> Vec<(f64, u16)> {
        vec![
            (0.0, 0x0000),
            (1.0, 0x0064),
            (-1.0, 0x879C),
            (20.48, 0x0C00),
            (21.5, 0x0C33),
            (-30.0, 0x8A24),
        ]
    }

    /// Typical room set points.
    pub fn set_points() -> Vec<f64> {
        vec![5.0, 16.5, 18.0, 20.0, 21.5, 22.0, 24.5, 30.0]
    }
}

// =============================================================================
// Store Fixtures
// =============================================================================

/// A store config for tests: immediate retries, fallback enabled.
pub fn test_store_config(attempts: u32) -> StoreConfig {
    StoreConfig::builder()
        .retry(RetryConfig::immediate(attempts))
        .enable_fallback(true)
        .build()
}

/// A store over a purely in-memory backend.
pub fn memory_store() -> SharedRegisterStore {
    Arc::new(PersistentRegisterStore::new(
        Arc::new(MemoryFallback::new()),
        test_store_config(1),
    ))
}

/// A store over `backend` with the given retry budget.
pub fn store_over(backend: Arc<dyn RegisterBackend>, attempts: u32) -> SharedRegisterStore {
    Arc::new(PersistentRegisterStore::new(
        backend,
        test_store_config(attempts),
    ))
}

/// Opens a SQLite-backed store in `dir`.
pub async fn sqlite_store(dir: &Path) -> SharedRegisterStore {
    let config = StoreConfig::builder()
        .path(dir.join("registers.db"))
        .retry(RetryConfig::immediate(2))
        .build();
    Arc::new(
        PersistentRegisterStore::open(config)
            .await
            .expect("Failed to open SQLite store"),
    )
}

// =============================================================================
// Manager Fixtures
// =============================================================================

/// Manager config whose breaker opens after `threshold` failures and stays
/// open for `recovery`.
pub fn manager_config(threshold: u32, recovery: Duration) -> ManagerConfig {
    ManagerConfig::default().with_circuit_breaker(
        CircuitBreakerConfig::builder()
            .failure_threshold(threshold)
            .recovery_timeout(recovery)
            .call_timeout(Some(Duration::from_millis(500)))
            .build(),
    )
}

/// A manager over a scripted bus and an in-memory store.
pub fn scripted_manager(bus: Arc<ScriptedBus>) -> SharedManager {
    Arc::new(ModbusManager::new(
        manager_config(3, Duration::from_secs(60)),
        memory_store(),
        bus,
    ))
}

/// A manager looping back to its own register context.
pub fn local_manager() -> SharedManager {
    Arc::new(ModbusManager::local(ManagerConfig::default(), memory_store()))
}

// =============================================================================
// Config Fixtures
// =============================================================================

/// Gateway configuration writing into `dir` and binding ephemeral ports.
pub fn gateway_config(dir: &Path) -> NeasmartConfig {
    let mut config = NeasmartConfig::default();
    config.store.database_path = dir.join("registers.db");
    config.store.retry_initial_delay = Duration::from_millis(1);
    config.server.bind_address = "127.0.0.1".to_string();
    config.server.port = 0;
    config.api.bind_address = "127.0.0.1".to_string();
    config.api.port = 0;
    config
}
