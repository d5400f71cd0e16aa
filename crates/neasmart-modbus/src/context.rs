// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory register image for one slave.
//!
//! The context is what the Neasmart master sees when it polls the gateway.
//! It is seeded from the register store at startup and kept current by every
//! manager operation. Unwritten registers read as zero.

use std::collections::HashMap;

use parking_lot::RwLock;

use neasmart_core::error::ValidationError;
use neasmart_core::types::{RegisterEntry, SlaveId};

/// Holding register image guarded by a read/write lock.
#[derive(Debug)]
pub struct RegisterContext {
    slave_id: SlaveId,
    registers: RwLock<HashMap<u16, u16>>,
}

impl RegisterContext {
    /// Creates an empty context for `slave_id`.
    pub fn new(slave_id: SlaveId) -> Self {
        Self {
            slave_id,
            registers: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the slave id this context belongs to.
    pub fn slave_id(&self) -> SlaveId {
        self.slave_id
    }

    /// Returns the value at `address`, or `None` if never written.
    pub fn get(&self, address: u16) -> Option<u16> {
        self.registers.read().get(&address).copied()
    }

    /// Reads `count` registers starting at `address`.
    ///
    /// Fails if the block runs past address 65535.
    pub fn read(&self, address: u16, count: u16) -> Result<Vec<u16>, ValidationError> {
        let end = u32::from(address) + u32::from(count);
        if end > u32::from(u16::MAX) + 1 {
            return Err(ValidationError::InvalidRange {
                start: u32::from(address),
                count: u32::from(count),
            });
        }

        let registers = self.registers.read();
        Ok((u32::from(address)..end)
            .map(|a| registers.get(&(a as u16)).copied().unwrap_or(0))
            .collect())
    }

    /// Sets one register.
    pub fn set(&self, address: u16, value: u16) {
        self.registers.write().insert(address, value);
    }

    /// Sets consecutive registers starting at `address`.
    pub fn set_block(&self, address: u16, values: &[u16]) -> Result<(), ValidationError> {
        let end = u32::from(address) + values.len() as u32;
        if end > u32::from(u16::MAX) + 1 {
            return Err(ValidationError::InvalidRange {
                start: u32::from(address),
                count: values.len() as u32,
            });
        }

        let mut registers = self.registers.write();
        for (offset, value) in values.iter().enumerate() {
            registers.insert(address + offset as u16, *value);
        }
        Ok(())
    }

    /// Loads stored entries, replacing current values at those addresses.
    pub fn load(&self, entries: &[RegisterEntry]) -> usize {
        let mut registers = self.registers.write();
        for entry in entries {
            registers.insert(entry.address, entry.value);
        }
        entries.len()
    }

    /// Number of registers that hold a value.
    pub fn len(&self) -> usize {
        self.registers.read().len()
    }

    /// Returns `true` if no register holds a value.
    pub fn is_empty(&self) -> bool {
        self.registers.read().is_empty()
    }
}
