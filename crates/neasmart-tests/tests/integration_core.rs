// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Core Integration Tests
//!
//! Integration tests for neasmart-core functionality including:
//!
//! - DPT 9.001 temperature codec
//! - Circuit breaker lifecycle
//! - Retry strategies
//! - Address and range validation
//!
//! ## Test Categories
//!
//! - `test_dpt_*`: Codec tests
//! - `test_breaker_*`: Circuit breaker tests
//! - `test_retry_*`: Retry strategy tests
//! - `test_range_*`: Register range tests

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use neasmart_core::{
    // Codec
    dpt9001,
    // Errors
    CodecError, StoreError, ValidationError,
    // Breaker
    CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitState,
    // Retry
    ExponentialBackoff, RetryConfig, RetryStrategy,
    // Types
    RegisterRange, SlaveId, parse_address,
};

use neasmart_tests::common::fixtures::TemperatureFixtures;

fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
    CircuitBreaker::new(
        "integration",
        CircuitBreakerConfig::builder()
            .failure_threshold(threshold)
            .recovery_timeout(recovery)
            .call_timeout(None)
            .build(),
    )
}

// =============================================================================
// DPT 9.001 Tests
// =============================================================================

#[test]
fn test_dpt_known_words() {
    for (celsius, word) in TemperatureFixtures::known_words() {
        assert_eq!(dpt9001::encode(celsius).unwrap(), word, "encode {celsius}");
        assert_eq!(dpt9001::decode(word), celsius, "decode {word:#06x}");
    }
}

#[test]
fn test_dpt_set_points_round_trip_exactly() {
    for celsius in TemperatureFixtures::set_points() {
        let word = dpt9001::encode(celsius).unwrap();
        assert!(
            (dpt9001::decode(word) - celsius).abs() < 1e-9,
            "{celsius} did not survive the round trip"
        );
    }
}

#[test]
fn test_dpt_rejects_instead_of_clamping() {
    let (min, max) = dpt9001::valid_range();
    assert!(matches!(
        dpt9001::encode(max + 100.0),
        Err(CodecError::OutOfRange { .. })
    ));
    assert!(matches!(
        dpt9001::encode(min - 100.0),
        Err(CodecError::OutOfRange { .. })
    ));
    assert!(dpt9001::encode(f64::NAN).is_err());
    assert!(dpt9001::encode(f64::NEG_INFINITY).is_err());
}

#[test]
fn test_dpt_resolution_grows_with_magnitude() {
    assert_eq!(dpt9001::resolution(21.5).unwrap(), 0.02);
    assert_eq!(dpt9001::resolution(20.0).unwrap(), 0.01);
    assert!(dpt9001::resolution(100_000.0).unwrap() > 1.0);
}

// =============================================================================
// Circuit Breaker Tests
// =============================================================================

#[tokio::test]
async fn test_breaker_full_lifecycle() {
    let cb = breaker(2, Duration::from_millis(50));

    for _ in 0..2 {
        let result: Result<(), CircuitError<&str>> = cb.call(|| async { Err("bus down") }).await;
        assert!(matches!(result, Err(CircuitError::Inner("bus down"))));
    }
    assert_eq!(cb.state(), CircuitState::Open);

    let calls = AtomicU32::new(0);
    let rejected: Result<(), CircuitError<&str>> = cb
        .call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert!(rejected.unwrap_err().is_open());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(80)).await;
    let trial: Result<u8, CircuitError<&str>> = cb.call(|| async { Ok(7) }).await;
    assert_eq!(trial.unwrap(), 7);
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.consecutive_failures(), 0);

    let metrics = cb.metrics();
    assert_eq!(metrics.total_failures, 2);
    assert_eq!(metrics.rejected_calls, 1);
}

#[tokio::test]
async fn test_breaker_shared_between_tasks() {
    let cb = Arc::new(breaker(5, Duration::from_secs(60)));
    let mut handles = Vec::new();

    for _ in 0..5 {
        let cb = cb.clone();
        handles.push(tokio::spawn(async move {
            let _: Result<(), CircuitError<&str>> = cb.call(|| async { Err("timeout") }).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cb.state(), CircuitState::Open);
    assert!(cb.is_rejecting());

    cb.reset();
    assert_eq!(cb.state(), CircuitState::Closed);
}

// =============================================================================
// Retry Tests
// =============================================================================

#[tokio::test]
async fn test_retry_store_errors_by_kind() {
    let strategy = ExponentialBackoff::new(RetryConfig::immediate(4));
    let attempts = AtomicU32::new(0);

    let outcome = strategy
        .execute(
            "locked",
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(StoreError::database("set", "database is locked"))
            },
            StoreError::is_retryable,
        )
        .await;
    assert_eq!(outcome.attempts(), 4);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);

    let outcome = strategy
        .execute(
            "corrupt",
            || async { Err::<(), _>(StoreError::corrupt(3, "not an integer")) },
            StoreError::is_retryable,
        )
        .await;
    assert_eq!(outcome.attempts(), 1);
}

#[test]
fn test_retry_backoff_is_capped() {
    let strategy = ExponentialBackoff::new(
        RetryConfig::with_max_attempts(10)
            .initial_delay(Duration::from_millis(100))
            .multiplier(2.0)
            .max_delay(Duration::from_millis(500)),
    );

    assert_eq!(strategy.calculate_delay(1), Duration::from_millis(100));
    assert_eq!(strategy.calculate_delay(2), Duration::from_millis(200));
    assert_eq!(strategy.calculate_delay(3), Duration::from_millis(400));
    assert_eq!(strategy.calculate_delay(8), Duration::from_millis(500));
}

// =============================================================================
// Address and Range Tests
// =============================================================================

#[test]
fn test_range_addresses_and_slave_ids() {
    assert_eq!(parse_address(65_535).unwrap(), 65_535);
    assert!(matches!(
        parse_address(65_536),
        Err(ValidationError::InvalidAddress { address: 65_536 })
    ));

    assert!(SlaveId::new(240).is_ok());
    assert!(SlaveId::new(0).is_err());
    assert!(SlaveId::new(248).is_err());

    assert!(RegisterRange::contiguous(65_530, 6).is_ok());
    assert!(RegisterRange::contiguous(65_530, 7).is_err());
    assert!(RegisterRange::addresses(Vec::<u16>::new()).is_err());
}

#[test]
fn test_range_chunks_follow_batch_size() {
    let range = RegisterRange::contiguous(0, 250).unwrap();
    assert_eq!(range.chunks(100), vec![(0, 100), (100, 100), (200, 50)]);

    let range = RegisterRange::addresses([9, 1, 2, 3, 7]).unwrap();
    assert_eq!(range.len(), 5);
    assert_eq!(range.chunks(125), vec![(1, 3), (7, 1), (9, 1)]);
}
