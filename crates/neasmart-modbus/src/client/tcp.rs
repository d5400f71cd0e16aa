// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus TCP client bus.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_modbus::client::Context as ModbusContext;
use tokio_modbus::prelude::*;

use neasmart_core::error::{BusError, BusResult};
use neasmart_core::types::SlaveId;

use crate::bus::RegisterBus;
use crate::types::TcpBusConfig;

/// Modbus TCP client implementing [`RegisterBus`].
///
/// The connection is opened on first use and dropped after any error that
/// leaves the stream in an unknown state. The next call reconnects.
///
/// # Example
///
/// ```rust,ignore
/// let bus = ModbusTcpBus::new(TcpBusConfig::with_host("192.168.1.50"));
/// let values = bus.read_holding_registers(SlaveId::default(), 0, 10).await?;
/// ```
pub struct ModbusTcpBus {
    config: TcpBusConfig,
    context: Mutex<Option<ModbusContext>>,
}

impl ModbusTcpBus {
    /// Creates a disconnected bus.
    pub fn new(config: TcpBusConfig) -> Self {
        Self {
            config,
            context: Mutex::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TcpBusConfig {
        &self.config
    }

    /// Returns the `host:port` target.
    pub fn target(&self) -> String {
        self.config.socket_addr()
    }

    /// Returns `true` if a connection is currently open.
    pub async fn is_connected(&self) -> bool {
        self.context.lock().await.is_some()
    }

    /// Closes the connection if one is open.
    pub async fn disconnect(&self) {
        if let Some(ctx) = self.context.lock().await.take() {
            super::close(ctx, &self.target()).await;
            tracing::info!(target_device = %self.target(), "Disconnected from Modbus TCP device");
        }
    }

    async fn connect(&self) -> BusResult<ModbusContext> {
        let target = self.target();

        let stream = timeout(self.config.connect_timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| BusError::timeout(self.config.connect_timeout))?
            .map_err(|e| BusError::connection_failed_with_source(&target, "connect failed", e))?;
        stream.set_nodelay(true).ok();

        tracing::info!(target_device = %target, "Connected to Modbus TCP device");
        Ok(tcp::attach(stream))
    }

    async fn ensure_connected<'a>(
        &self,
        slot: &'a mut Option<ModbusContext>,
    ) -> BusResult<&'a mut ModbusContext> {
        if slot.is_none() {
            *slot = Some(self.connect().await?);
        }
        slot.as_mut().ok_or(BusError::NotConnected)
    }

    async fn settle<T>(&self, slot: &mut Option<ModbusContext>, result: &BusResult<T>) {
        if let Err(e) = result {
            if e.requires_reconnect() {
                if let Some(ctx) = slot.take() {
                    tracing::warn!(
                        target_device = %self.target(),
                        error = %e,
                        "Dropping Modbus TCP connection"
                    );
                    super::close(ctx, &self.target()).await;
                }
            }
        }
    }
}

#[async_trait]
impl RegisterBus for ModbusTcpBus {
    async fn read_holding_registers(
        &self,
        slave: SlaveId,
        address: u16,
        count: u16,
    ) -> BusResult<Vec<u16>> {
        let mut slot = self.context.lock().await;
        let ctx = self.ensure_connected(&mut slot).await?;
        let result =
            super::read_registers(ctx, slave, address, count, self.config.operation_timeout).await;
        self.settle(&mut slot, &result).await;
        result
    }

    async fn write_single_register(
        &self,
        slave: SlaveId,
        address: u16,
        value: u16,
    ) -> BusResult<()> {
        let mut slot = self.context.lock().await;
        let ctx = self.ensure_connected(&mut slot).await?;
        let result =
            super::write_register(ctx, slave, address, value, self.config.operation_timeout).await;
        self.settle(&mut slot, &result).await;
        result
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

impl std::fmt::Debug for ModbusTcpBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusTcpBus")
            .field("target", &self.target())
            .field("operation_timeout", &self.config.operation_timeout)
            .finish()
    }
}
