// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus RTU client bus over a serial port.
//!
//! Serial settings follow the Neasmart defaults (38400 baud, 8N1). Only one
//! request is on the wire at a time; the context lock serializes callers.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_modbus::client::Context as ModbusContext;
use tokio_modbus::prelude::*;
use tokio_serial::{
    DataBits as SerialDataBits, Parity as SerialParity, SerialPortBuilderExt,
    StopBits as SerialStopBits,
};

use neasmart_core::error::{BusError, BusResult};
use neasmart_core::types::SlaveId;

use crate::bus::RegisterBus;
use crate::types::{DataBits, Parity, RtuBusConfig, StopBits};

/// Modbus RTU client implementing [`RegisterBus`].
pub struct ModbusRtuBus {
    config: RtuBusConfig,
    context: Mutex<Option<ModbusContext>>,
}

impl ModbusRtuBus {
    /// Creates a bus; the port is opened on first use.
    pub fn new(config: RtuBusConfig) -> Self {
        Self {
            config,
            context: Mutex::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RtuBusConfig {
        &self.config
    }

    /// Returns `true` if the serial port is open.
    pub async fn is_connected(&self) -> bool {
        self.context.lock().await.is_some()
    }

    /// Closes the serial port if open.
    pub async fn disconnect(&self) {
        if let Some(ctx) = self.context.lock().await.take() {
            super::close(ctx, &self.config.port).await;
            tracing::info!(port = %self.config.port, "Closed Modbus RTU port");
        }
    }

    fn open(&self) -> BusResult<ModbusContext> {
        let builder = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .data_bits(convert_data_bits(self.config.data_bits))
            .parity(convert_parity(self.config.parity))
            .stop_bits(convert_stop_bits(self.config.stop_bits))
            .timeout(self.config.timeout);

        let serial = builder.open_native_async().map_err(|e| {
            let message = match e.kind() {
                tokio_serial::ErrorKind::NoDevice => "device not found".to_string(),
                tokio_serial::ErrorKind::InvalidInput => "invalid serial settings".to_string(),
                _ => e.description.clone(),
            };
            BusError::connection_failed_with_source(&self.config.port, message, e)
        })?;

        tracing::info!(
            port = %self.config.port,
            baud_rate = self.config.baud_rate,
            frame = %self.config.frame_format(),
            "Opened Modbus RTU port"
        );
        Ok(rtu::attach(serial))
    }

    fn ensure_open<'a>(
        &self,
        slot: &'a mut Option<ModbusContext>,
    ) -> BusResult<&'a mut ModbusContext> {
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        slot.as_mut().ok_or(BusError::NotConnected)
    }

    async fn settle<T>(&self, slot: &mut Option<ModbusContext>, result: &BusResult<T>) {
        if let Err(e) = result {
            if e.requires_reconnect() {
                if let Some(ctx) = slot.take() {
                    tracing::warn!(port = %self.config.port, error = %e, "Reopening Modbus RTU port on next request");
                    super::close(ctx, &self.config.port).await;
                }
            }
        }
    }
}

#[async_trait]
impl RegisterBus for ModbusRtuBus {
    async fn read_holding_registers(
        &self,
        slave: SlaveId,
        address: u16,
        count: u16,
    ) -> BusResult<Vec<u16>> {
        let mut slot = self.context.lock().await;
        let ctx = self.ensure_open(&mut slot)?;
        let result = super::read_registers(ctx, slave, address, count, self.config.timeout).await;
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
        let ctx = self.ensure_open(&mut slot)?;
        let result = super::write_register(ctx, slave, address, value, self.config.timeout).await;
        self.settle(&mut slot, &result).await;
        result
    }

    fn name(&self) -> &str {
        "rtu"
    }
}

impl std::fmt::Debug for ModbusRtuBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusRtuBus")
            .field("port", &self.config.port)
            .field("baud_rate", &self.config.baud_rate)
            .field("frame", &self.config.frame_format())
            .finish()
    }
}

fn convert_data_bits(bits: DataBits) -> SerialDataBits {
    match bits {
        DataBits::Seven => SerialDataBits::Seven,
        DataBits::Eight => SerialDataBits::Eight,
    }
}

fn convert_parity(parity: Parity) -> SerialParity {
    match parity {
        Parity::None => SerialParity::None,
        Parity::Odd => SerialParity::Odd,
        Parity::Even => SerialParity::Even,
    }
}

fn convert_stop_bits(bits: StopBits) -> SerialStopBits {
    match bits {
        StopBits::One => SerialStopBits::One,
        StopBits::Two => SerialStopBits::Two,
    }
}
