// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Loopback bus over the gateway's own register context.
//!
//! Used when the Neasmart is the Modbus master: there is no device to poll,
//! the "bus" is the register image the master reads and writes through the
//! gateway's Modbus server.

use std::sync::Arc;

use async_trait::async_trait;

use neasmart_core::error::{BusError, BusResult};
use neasmart_core::types::SlaveId;

use crate::bus::RegisterBus;
use crate::context::RegisterContext;

/// A [`RegisterBus`] backed by a [`RegisterContext`].
#[derive(Debug, Clone)]
pub struct LocalBus {
    context: Arc<RegisterContext>,
}

impl LocalBus {
    /// Creates a loopback bus over `context`.
    pub fn new(context: Arc<RegisterContext>) -> Self {
        Self { context }
    }

    fn check_slave(&self, slave: SlaveId) -> BusResult<()> {
        if slave != self.context.slave_id() {
            // Gateway address mismatch; a real device would not answer.
            return Err(BusError::Exception {
                function: 0x03,
                code: 0x0B,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RegisterBus for LocalBus {
    async fn read_holding_registers(
        &self,
        slave: SlaveId,
        address: u16,
        count: u16,
    ) -> BusResult<Vec<u16>> {
        self.check_slave(slave)?;
        self.context
            .read(address, count)
            .map_err(|e| BusError::read_failed(address, count, e.to_string()))
    }

    async fn write_single_register(
        &self,
        slave: SlaveId,
        address: u16,
        value: u16,
    ) -> BusResult<()> {
        self.check_slave(slave)?;
        self.context.set(address, value);
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_bus_round_trip() {
        let context = Arc::new(RegisterContext::new(SlaveId::default()));
        let bus = LocalBus::new(context.clone());
        let slave = SlaveId::default();

        bus.write_single_register(slave, 5, 55).await.unwrap();
        assert_eq!(context.get(5), Some(55));
        assert_eq!(bus.read_holding_registers(slave, 4, 2).await.unwrap(), vec![0, 55]);
    }

    #[tokio::test]
    async fn test_local_bus_rejects_other_slave() {
        let context = Arc::new(RegisterContext::new(SlaveId::default()));
        let bus = LocalBus::new(context);
        let other = SlaveId::new(1).unwrap();

        assert!(matches!(
            bus.read_holding_registers(other, 0, 1).await,
            Err(BusError::Exception { code: 0x0B, .. })
        ));
    }
}
