// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Store Integration Tests
//!
//! Integration tests for neasmart-store functionality including:
//!
//! - SQLite persistence across reopen
//! - Retry budget before falling back
//! - Fallback shadowing and resynchronization
//! - Concurrent writers
//!
//! ## Test Categories
//!
//! - `test_sqlite_*`: Durable backend tests
//! - `test_fallback_*`: Degraded mode tests
//! - `test_store_*`: General store behavior

use std::sync::Arc;

use neasmart_core::{RetryConfig, StoreError, WriteSource};
use neasmart_store::{PersistentRegisterStore, RegisterBackend, StoreConfig};

use neasmart_tests::common::{
    init_test_logging, temp_test_dir,
    fixtures::{sqlite_store, store_over},
    mocks::FailingBackend,
};

// =============================================================================
// SQLite Tests
// =============================================================================

#[tokio::test]
async fn test_sqlite_values_survive_reopen() {
    init_test_logging();
    let dir = temp_test_dir("neasmart_store");

    {
        let store = sqlite_store(dir.path()).await;
        store.set(1, 100, WriteSource::Api).await.unwrap();
        store.set(2, 200, WriteSource::Sync).await.unwrap();
        store.set(1, 101, WriteSource::Remote).await.unwrap();
    }

    let store = sqlite_store(dir.path()).await;
    assert!(!store.using_fallback());
    assert_eq!(store.get(1).await.unwrap(), 101);
    assert_eq!(store.get(2).await.unwrap(), 200);
    assert_eq!(store.get(3).await.unwrap(), 0);

    let entries = store.entries().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].address, 1);
    assert_eq!(entries[0].source, WriteSource::Remote);
    assert_eq!(entries[1].source, WriteSource::Sync);
}

#[tokio::test]
async fn test_sqlite_unopenable_path_starts_on_fallback() {
    let dir = temp_test_dir("neasmart_store");
    // A directory where the database file should be.
    let blocked = dir.path().join("blocked.db");
    std::fs::create_dir(&blocked).unwrap();

    let config = StoreConfig::builder()
        .path(&blocked)
        .retry(RetryConfig::immediate(1))
        .build();
    let store = PersistentRegisterStore::open(config.clone()).await.unwrap();
    assert!(store.using_fallback());

    store.set(5, 55, WriteSource::Api).await.unwrap();
    assert_eq!(store.get(5).await.unwrap(), 55);
    assert!(!store.health_check().await.healthy);

    let strict = StoreConfig {
        enable_fallback: false,
        ..config
    };
    assert!(PersistentRegisterStore::open(strict).await.is_err());
}

// =============================================================================
// Fallback Tests
// =============================================================================

#[tokio::test]
async fn test_fallback_retries_before_degrading() {
    let backend = Arc::new(FailingBackend::new());
    let store = store_over(backend.clone(), 3);

    // Two transient failures fit inside a budget of three attempts.
    backend.fail_next(2);
    store.set(1, 10, WriteSource::Api).await.unwrap();
    assert!(!store.using_fallback());
    assert_eq!(backend.durable_value(1), Some(10));
    assert_eq!(backend.call_count(), 3);

    backend.set_failing(true);
    store.set(2, 20, WriteSource::Api).await.unwrap();
    assert!(store.using_fallback());
    assert_eq!(store.fallback_len(), 1);
    assert_eq!(backend.durable_value(2), None);
}

#[tokio::test]
async fn test_fallback_shadows_durable_values() {
    let backend = Arc::new(FailingBackend::new());
    let store = store_over(backend.clone(), 1);

    store.set(7, 70, WriteSource::Sync).await.unwrap();
    backend.set_failing(true);
    store.set(7, 71, WriteSource::Api).await.unwrap();

    backend.set_failing(false);
    // The durable backend still holds 70; the fallback entry wins.
    assert_eq!(backend.durable_value(7), Some(70));
    assert_eq!(store.get(7).await.unwrap(), 71);

    let entries = store.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].value, 71);
}

#[tokio::test]
async fn test_fallback_serves_last_durable_value_during_outage() {
    let backend = Arc::new(FailingBackend::new());
    let store = store_over(backend.clone(), 2);

    store.set(7, 2150, WriteSource::Api).await.unwrap();
    store.set(8, 1900, WriteSource::Sync).await.unwrap();
    backend.set_failing(true);

    assert_eq!(store.get(7).await.unwrap(), 2150);
    assert!(store.using_fallback());
    assert_eq!(store.get(8).await.unwrap(), 1900);
    assert_eq!(store.get(9).await.unwrap(), 0);

    store.set(8, 1950, WriteSource::Api).await.unwrap();
    assert_eq!(store.get(8).await.unwrap(), 1950);
    assert_eq!(store.fallback_len(), 1);
}

#[tokio::test]
async fn test_fallback_resync_restores_durable_mode() {
    let backend = Arc::new(FailingBackend::broken());
    let store = store_over(backend.clone(), 1);

    for address in 0..5 {
        store.set(address, address * 10, WriteSource::Api).await.unwrap();
    }
    assert!(store.using_fallback());
    assert_eq!(store.fallback_len(), 5);

    assert!(matches!(
        store.resync_fallback().await,
        Err(StoreError::Unavailable { .. })
    ));
    assert!(store.using_fallback());

    backend.set_failing(false);
    assert!(store.health_check().await.healthy);
    // A healthy check alone does not leave fallback mode.
    assert!(store.using_fallback());

    assert_eq!(store.resync_fallback().await.unwrap(), 5);
    assert!(!store.using_fallback());
    assert_eq!(store.fallback_len(), 0);
    assert_eq!(backend.durable_len(), 5);
    assert_eq!(backend.durable_value(4), Some(40));
}

#[tokio::test]
async fn test_fallback_disabled_surfaces_errors() {
    let backend = Arc::new(FailingBackend::broken());
    let config = StoreConfig::builder()
        .retry(RetryConfig::immediate(2))
        .enable_fallback(false)
        .build();
    let store = PersistentRegisterStore::new(backend.clone(), config);

    assert!(matches!(
        store.set(1, 1, WriteSource::Api).await,
        Err(StoreError::Unavailable { .. })
    ));
    assert!(store.get(1).await.is_err());
    assert!(!store.using_fallback());
    assert_eq!(backend.call_count(), 4);
}

// =============================================================================
// General Store Tests
// =============================================================================

#[tokio::test]
async fn test_store_concurrent_writers_last_write_wins_per_address() {
    let dir = temp_test_dir("neasmart_store");
    let store = sqlite_store(dir.path()).await;

    let mut handles = Vec::new();
    for task in 0..8u16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..10u16 {
                store
                    .set(task, task * 100 + i, WriteSource::Api)
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for task in 0..8u16 {
        assert_eq!(store.get(task).await.unwrap(), task * 100 + 9);
    }
    assert_eq!(store.entries().await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_store_status_reports_backend() {
    let backend = Arc::new(FailingBackend::new());
    let store = store_over(backend.clone(), 1);

    let status = store.health_check().await;
    assert!(status.healthy);
    assert_eq!(status.backend, backend.name());
    assert_eq!(status.fallback_entries, 0);

    backend.set_failing(true);
    let status = store.health_check().await;
    assert!(!status.healthy);
    assert!(status.last_error.unwrap().contains("locked"));
}
