// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! SQLite register backend.
//!
//! # Table Layout
//!
//! ```text
//! holding_registers
//! ┌──────────────────────┬───────────────────┬─────────────────┬─────────────┐
//! │ address INTEGER (PK) │ value INTEGER     │ last_modified   │ source TEXT │
//! │                      │ NOT NULL          │ TEXT (RFC 3339) │             │
//! └──────────────────────┴───────────────────┴─────────────────┴─────────────┘
//! ```
//!
//! A missing row means "never written". The database runs in WAL mode with a
//! busy timeout so the API and the Modbus server can read concurrently.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use tracing::{info, warn};

use neasmart_core::error::{StoreError, StoreResult};
use neasmart_core::types::{RegisterEntry, WriteSource};

use crate::traits::RegisterBackend;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS holding_registers (
    address INTEGER PRIMARY KEY,
    value INTEGER NOT NULL,
    last_modified TEXT,
    source TEXT
)";

const UPSERT: &str = "INSERT INTO holding_registers (address, value, last_modified, source)
VALUES (?, ?, ?, ?)
ON CONFLICT(address) DO UPDATE SET
    value = excluded.value,
    last_modified = excluded.last_modified,
    source = excluded.source";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// SqliteBackend
// =============================================================================

/// Durable register backend on a single SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteBackend {
    /// Opens (creating if needed) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::database("open", format!("{}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| db_error("open", e))?;

        let backend = Self { pool, path };
        backend.init_schema().await?;

        info!(path = %backend.path.display(), "Register database opened");
        Ok(backend)
    }

    /// Opens a private in-memory database.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);

        // A single long-lived connection keeps the database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| db_error("open", e))?;

        let backend = Self {
            pool,
            path: PathBuf::from(":memory:"),
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("init_schema", e))?;
        Ok(())
    }

    /// Returns the database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RegisterBackend for SqliteBackend {
    async fn get(&self, address: u16) -> StoreResult<Option<u16>> {
        let row = sqlx::query("SELECT value FROM holding_registers WHERE address = ?")
            .bind(i64::from(address))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get", e))?;

        row.map(|row| read_value(address, &row)).transpose()
    }

    async fn set(&self, entry: &RegisterEntry) -> StoreResult<()> {
        sqlx::query(UPSERT)
            .bind(i64::from(entry.address))
            .bind(i64::from(entry.value))
            .bind(entry.last_modified.to_rfc3339_opts(SecondsFormat::Millis, true))
            .bind(entry.source.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("set", e))?;
        Ok(())
    }

    async fn entries(&self) -> StoreResult<Vec<RegisterEntry>> {
        let rows = sqlx::query(
            "SELECT address, value, last_modified, source FROM holding_registers ORDER BY address",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("entries", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            match read_entry(row) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "Skipping unreadable register row"),
            }
        }
        Ok(entries)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("ping", e))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

// =============================================================================
// Row decoding
// =============================================================================

fn db_error(operation: &str, error: sqlx::Error) -> StoreError {
    StoreError::database(operation, error.to_string())
}

fn read_value(address: u16, row: &SqliteRow) -> StoreResult<u16> {
    let raw: i64 = row
        .try_get("value")
        .map_err(|e| StoreError::corrupt(address, e.to_string()))?;
    u16::try_from(raw)
        .map_err(|_| StoreError::corrupt(address, format!("value {raw} is not a 16-bit register")))
}

fn read_entry(row: &SqliteRow) -> StoreResult<RegisterEntry> {
    let raw_address: i64 = row
        .try_get("address")
        .map_err(|e| StoreError::corrupt(0, e.to_string()))?;
    let address = u16::try_from(raw_address)
        .map_err(|_| StoreError::corrupt(0, format!("address {raw_address} out of range")))?;

    let value = read_value(address, row)?;

    let last_modified = row
        .try_get::<Option<String>, _>("last_modified")
        .ok()
        .flatten()
        .and_then(|text| parse_timestamp(&text))
        .unwrap_or_default();

    let source = row
        .try_get::<Option<String>, _>("source")
        .ok()
        .flatten()
        .and_then(|tag| WriteSource::parse(&tag))
        .unwrap_or_default();

    Ok(RegisterEntry {
        address,
        value,
        last_modified,
        source,
    })
}

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` format.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

// =============================================================================
// Tests
// =============================================================================
