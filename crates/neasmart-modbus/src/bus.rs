// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Register bus abstraction.
//!
//! The manager only needs two function codes from whatever sits on the other
//! end: read holding registers (FC 0x03) and write single register (FC 0x06).
//!
//! # Implementors
//!
//! - [`ModbusTcpBus`](crate::client::ModbusTcpBus): Modbus TCP client
//! - [`ModbusRtuBus`](crate::client::ModbusRtuBus): Modbus RTU client
//! - [`LocalBus`](crate::local::LocalBus): loops back to the register context

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use neasmart_core::error::BusResult;
use neasmart_core::types::SlaveId;

use crate::client::{ModbusRtuBus, ModbusTcpBus};
use crate::context::RegisterContext;
use crate::local::LocalBus;
use crate::types::{BusConfig, BusKind};

/// A physical or logical Modbus register bus.
#[async_trait]
pub trait RegisterBus: Send + Sync + Debug {
    /// Reads `count` holding registers starting at `address` (FC 0x03).
    async fn read_holding_registers(
        &self,
        slave: SlaveId,
        address: u16,
        count: u16,
    ) -> BusResult<Vec<u16>>;

    /// Writes one holding register (FC 0x06).
    async fn write_single_register(&self, slave: SlaveId, address: u16, value: u16)
        -> BusResult<()>;

    /// Bus name for logs and health output.
    fn name(&self) -> &str;
}

/// A bus shared between the manager and its owner.
pub type SharedBus = Arc<dyn RegisterBus>;

/// Builds the bus selected by `config`.
///
/// The local bus loops back to `context`; the network buses connect on
/// first use.
pub fn build_bus(config: &BusConfig, context: Arc<RegisterContext>) -> SharedBus {
    match config.kind {
        BusKind::Local => Arc::new(LocalBus::new(context)),
        BusKind::Tcp => Arc::new(ModbusTcpBus::new(config.tcp.clone())),
        BusKind::Rtu => Arc::new(ModbusRtuBus::new(config.rtu.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_bus_by_kind() {
        let context = Arc::new(RegisterContext::new(SlaveId::default()));
        let mut config = BusConfig::default();
        assert_eq!(build_bus(&config, context.clone()).name(), "local");

        config.kind = BusKind::Tcp;
        assert_eq!(build_bus(&config, context.clone()).name(), "tcp");

        config.kind = BusKind::Rtu;
        assert_eq!(build_bus(&config, context).name(), "rtu");
    }
}
