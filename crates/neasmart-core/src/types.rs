// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Register-level data types.
//!
//! Every holding register is treated the same way: a 16-bit address mapped to
//! a 16-bit unsigned value. Zone, mode and sensor meanings live outside the
//! core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Highest valid Modbus unicast slave id.
pub const MAX_SLAVE_ID: u8 = 247;

/// Default Neasmart 2.0 slave id.
pub const DEFAULT_SLAVE_ID: u8 = 240;

/// Number of holding register addresses.
pub const ADDRESS_SPACE: u64 = 1 << 16;

// =============================================================================
// SlaveId
// =============================================================================

/// A validated Modbus slave (unit) id in `1..=247`.
///
/// # Examples
///
/// ```
/// use neasmart_core::types::SlaveId;
///
/// let id = SlaveId::new(240).unwrap();
/// assert_eq!(id.get(), 240);
/// assert!(SlaveId::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlaveId(u8);

impl SlaveId {
    /// Creates a slave id, rejecting broadcast (0) and reserved ids.
    pub fn new(id: u8) -> Result<Self, ValidationError> {
        if id == 0 || id > MAX_SLAVE_ID {
            return Err(ValidationError::InvalidSlaveId { slave_id: id });
        }
        Ok(Self(id))
    }

    /// Returns the raw id.
    #[inline]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for SlaveId {
    fn default() -> Self {
        Self(DEFAULT_SLAVE_ID)
    }
}

impl TryFrom<u8> for SlaveId {
    type Error = ValidationError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<SlaveId> for u8 {
    fn from(id: SlaveId) -> Self {
        id.0
    }
}

impl fmt::Display for SlaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validates a raw address coming from outside the core.
pub fn parse_address(raw: u32) -> Result<u16, ValidationError> {
    u16::try_from(raw).map_err(|_| ValidationError::InvalidAddress { address: raw })
}

// =============================================================================
// WriteSource / ValueOrigin
// =============================================================================

/// Who produced a stored register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteSource {
    /// Written through the gateway API.
    #[default]
    Api,
    /// Read back from the bus during a live read.
    Bus,
    /// Written by a batch synchronization.
    Sync,
    /// Written by the Modbus master through the gateway's server.
    Remote,
}

impl WriteSource {
    /// Returns the tag stored alongside the value.
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteSource::Api => "api",
            WriteSource::Bus => "bus",
            WriteSource::Sync => "sync",
            WriteSource::Remote => "remote",
        }
    }

    /// Parses a stored tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "api" => Some(WriteSource::Api),
            "bus" => Some(WriteSource::Bus),
            "sync" => Some(WriteSource::Sync),
            "remote" => Some(WriteSource::Remote),
            _ => None,
        }
    }
}

impl fmt::Display for WriteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a returned register value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueOrigin {
    /// Fresh from the bus.
    Live,
    /// Last known value from the register store.
    Cached,
}

impl ValueOrigin {
    /// Returns `true` for cached values.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, ValueOrigin::Cached)
    }
}

// =============================================================================
// RegisterEntry
// =============================================================================

/// A stored register value with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEntry {
    /// Register address.
    pub address: u16,
    /// Register value.
    pub value: u16,
    /// When the value was accepted.
    pub last_modified: DateTime<Utc>,
    /// Who wrote it.
    pub source: WriteSource,
}

impl RegisterEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(address: u16, value: u16, source: WriteSource) -> Self {
        Self {
            address,
            value,
            last_modified: Utc::now(),
            source,
        }
    }
}

// =============================================================================
// RegisterRange
// =============================================================================

/// A set of addresses for bulk operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterRange {
    /// `count` registers starting at `start`.
    ///
    /// `count` reaches 65536 so the whole address space fits in one range.
    Contiguous {
        /// First address.
        start: u16,
        /// Number of registers.
        count: u32,
    },
    /// An explicit list of addresses.
    Addresses(Vec<u16>),
}

impl RegisterRange {
    /// Creates a contiguous range, rejecting empty ranges and ranges that
    /// run past address 65535.
    pub fn contiguous(start: u16, count: u32) -> Result<Self, ValidationError> {
        let end = u64::from(start) + u64::from(count);
        if count == 0 || end > ADDRESS_SPACE {
            return Err(ValidationError::InvalidRange {
                start: u32::from(start),
                count,
            });
        }
        Ok(Self::Contiguous { start, count })
    }

    /// Every address from 0 to 65535.
    pub fn all() -> Self {
        Self::Contiguous {
            start: 0,
            count: ADDRESS_SPACE as u32,
        }
    }

    /// Creates an enumerated range. Duplicates are removed.
    pub fn addresses(addresses: impl IntoIterator<Item = u16>) -> Result<Self, ValidationError> {
        let mut addresses: Vec<u16> = addresses.into_iter().collect();
        addresses.sort_unstable();
        addresses.dedup();
        if addresses.is_empty() {
            return Err(ValidationError::InvalidRange { start: 0, count: 0 });
        }
        Ok(Self::Addresses(addresses))
    }

    /// Checks the invariants of a deserialized range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            RegisterRange::Contiguous { start, count } => {
                Self::contiguous(*start, *count).map(|_| ())
            }
            RegisterRange::Addresses(addresses) if addresses.is_empty() => {
                Err(ValidationError::InvalidRange { start: 0, count: 0 })
            }
            RegisterRange::Addresses(_) => Ok(()),
        }
    }

    /// Number of distinct addresses.
    pub fn len(&self) -> usize {
        match self {
            RegisterRange::Contiguous { count, .. } => *count as usize,
            RegisterRange::Addresses(addresses) => {
                let mut sorted = addresses.clone();
                sorted.sort_unstable();
                sorted.dedup();
                sorted.len()
            }
        }
    }

    /// Returns `true` if the range holds no address.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the addresses in ascending order.
    pub fn to_vec(&self) -> Vec<u16> {
        match self {
            RegisterRange::Contiguous { start, count } => {
                let start = u32::from(*start);
                (start..start.saturating_add(*count))
                    .filter_map(|a| u16::try_from(a).ok())
                    .collect()
            }
            RegisterRange::Addresses(addresses) => {
                let mut sorted = addresses.clone();
                sorted.sort_unstable();
                sorted.dedup();
                sorted
            }
        }
    }

    /// Splits the range into contiguous `(start, count)` runs of at most
    /// `max_len` registers, suitable for one read request each.
    pub fn chunks(&self, max_len: u16) -> Vec<(u16, u16)> {
        let max_len = max_len.max(1);
        let mut chunks = Vec::new();
        let mut current: Option<(u16, u16)> = None;

        for address in self.to_vec() {
            current = match current {
                Some((start, count))
                    if count < max_len && u32::from(start) + u32::from(count) == u32::from(address) =>
                {
                    Some((start, count + 1))
                }
                Some(run) => {
                    chunks.push(run);
                    Some((address, 1))
                }
                None => Some((address, 1)),
            };
        }
        if let Some(run) = current {
            chunks.push(run);
        }
        chunks
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slave_id_bounds() {
        assert!(SlaveId::new(1).is_ok());
        assert!(SlaveId::new(247).is_ok());
        assert_eq!(
            SlaveId::new(0),
            Err(ValidationError::InvalidSlaveId { slave_id: 0 })
        );
        assert!(SlaveId::new(248).is_err());
        assert_eq!(SlaveId::default().get(), DEFAULT_SLAVE_ID);
    }

    #[test]
    fn test_slave_id_serde() {
        let id: SlaveId = serde_json::from_str("240").unwrap();
        assert_eq!(id.get(), 240);
        assert!(serde_json::from_str::<SlaveId>("0").is_err());
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address(0), Ok(0));
        assert_eq!(parse_address(65_535), Ok(65_535));
        assert_eq!(
            parse_address(65_536),
            Err(ValidationError::InvalidAddress { address: 65_536 })
        );
    }

    #[test]
    fn test_write_source_tags() {
        for source in [
            WriteSource::Api,
            WriteSource::Bus,
            WriteSource::Sync,
            WriteSource::Remote,
        ] {
            assert_eq!(WriteSource::parse(source.as_str()), Some(source));
        }
        assert_eq!(WriteSource::parse("unknown"), None);
    }

    #[test]
    fn test_contiguous_range_limits() {
        assert!(RegisterRange::contiguous(0, 0).is_err());
        assert!(RegisterRange::contiguous(65_535, 1).is_ok());
        assert!(RegisterRange::contiguous(65_535, 2).is_err());
        assert_eq!(RegisterRange::contiguous(10, 5).unwrap().len(), 5);
        assert_eq!(RegisterRange::contiguous(0, 65_536).unwrap(), RegisterRange::all());
        assert!(RegisterRange::contiguous(0, 65_537).is_err());
        assert!(RegisterRange::contiguous(1, 65_536).is_err());
    }

    #[test]
    fn test_address_range_dedup() {
        let range = RegisterRange::addresses([5, 1, 5, 3]).unwrap();
        assert_eq!(range.to_vec(), vec![1, 3, 5]);
        assert!(RegisterRange::addresses([]).is_err());
    }

    #[test]
    fn test_chunks_split_runs_and_limits() {
        let range = RegisterRange::contiguous(0, 250).unwrap();
        assert_eq!(range.chunks(100), vec![(0, 100), (100, 100), (200, 50)]);

        let range = RegisterRange::addresses([1, 2, 3, 10, 11, 20]).unwrap();
        assert_eq!(range.chunks(100), vec![(1, 3), (10, 2), (20, 1)]);
        assert_eq!(range.chunks(2), vec![(1, 2), (3, 1), (10, 2), (20, 1)]);
    }

    #[test]
    fn test_chunks_at_end_of_address_space() {
        let range = RegisterRange::contiguous(65_530, 6).unwrap();
        assert_eq!(range.chunks(100), vec![(65_530, 6)]);

        let chunks = RegisterRange::all().chunks(125);
        assert_eq!(chunks.len(), 525);
        assert_eq!(chunks.first(), Some(&(0, 125)));
        assert_eq!(chunks.last(), Some(&(65_500, 36)));
        let total: u32 = chunks.iter().map(|&(_, count)| u32::from(count)).sum();
        assert_eq!(total, 65_536);
    }
}
