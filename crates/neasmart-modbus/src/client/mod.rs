// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus client buses.
//!
//! Both clients share the same shape:
//!
//! ```text
//! ┌────────────────────────────┐
//! │        RegisterBus         │
//! └─────────────┬──────────────┘
//!        ┌──────┴───────┐
//!        ▼              ▼
//! ┌─────────────┐ ┌─────────────┐
//! │ ModbusTcpBus│ │ ModbusRtuBus│     lazy connect, one request at a time,
//! │ (TCP stream)│ │(serial port)│     per-operation timeout, reconnect on
//! └──────┬──────┘ └──────┬──────┘     transport failure
//!        └──────┬───────┘
//!               ▼
//!      tokio-modbus client::Context
//! ```

mod rtu;
mod tcp;

pub use rtu::ModbusRtuBus;
pub use tcp::ModbusTcpBus;

use std::io;
use std::time::Duration;

use tokio::time::timeout;
use tokio_modbus::client::Context as ModbusContext;
use tokio_modbus::prelude::*;
use tokio_modbus::{Error as TokioModbusError, ExceptionCode};

use neasmart_core::error::{BusError, BusResult};
use neasmart_core::types::SlaveId;

const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Reads holding registers on an open context.
pub(crate) async fn read_registers(
    ctx: &mut ModbusContext,
    slave: SlaveId,
    address: u16,
    count: u16,
    limit: Duration,
) -> BusResult<Vec<u16>> {
    ctx.set_slave(Slave(slave.get()));

    let values = timeout(limit, ctx.read_holding_registers(address, count))
        .await
        .map_err(|_| BusError::timeout(limit))?
        .map_err(|e| map_modbus_error(e, limit, || format!("read {count} at {address}")))?
        .map_err(|code| exception(FC_READ_HOLDING_REGISTERS, code))?;

    if values.len() != usize::from(count) {
        return Err(BusError::invalid_response(format!(
            "expected {count} registers at {address}, got {}",
            values.len()
        )));
    }
    Ok(values)
}

/// Writes one holding register on an open context.
pub(crate) async fn write_register(
    ctx: &mut ModbusContext,
    slave: SlaveId,
    address: u16,
    value: u16,
    limit: Duration,
) -> BusResult<()> {
    ctx.set_slave(Slave(slave.get()));

    timeout(limit, ctx.write_single_register(address, value))
        .await
        .map_err(|_| BusError::timeout(limit))?
        .map_err(|e| map_modbus_error(e, limit, || format!("write {value} to {address}")))?
        .map_err(|code| exception(FC_WRITE_SINGLE_REGISTER, code))?;
    Ok(())
}

/// Closes a context, logging instead of failing.
pub(crate) async fn close(mut ctx: ModbusContext, target: &str) {
    if let Err(e) = ctx.disconnect().await {
        tracing::warn!(target_device = %target, error = %e, "Error disconnecting from Modbus device");
    }
}

/// Maps a tokio-modbus transport or protocol error to a bus error.
fn map_modbus_error(
    error: TokioModbusError,
    limit: Duration,
    operation: impl FnOnce() -> String,
) -> BusError {
    match error {
        TokioModbusError::Transport(io_error) => match io_error.kind() {
            io::ErrorKind::TimedOut => BusError::timeout(limit),
            io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => BusError::NotConnected,
            _ => BusError::connection_failed_with_source(operation(), "transport error", io_error),
        },
        TokioModbusError::Protocol(protocol_error) => {
            BusError::invalid_response(format!("{}: {protocol_error}", operation()))
        }
    }
}

fn exception(function: u8, code: ExceptionCode) -> BusError {
    BusError::Exception {
        function,
        code: exception_code_to_u8(code),
    }
}

/// Converts ExceptionCode to u8.
pub(crate) fn exception_code_to_u8(code: ExceptionCode) -> u8 {
    match code {
        ExceptionCode::IllegalFunction => 0x01,
        ExceptionCode::IllegalDataAddress => 0x02,
        ExceptionCode::IllegalDataValue => 0x03,
        ExceptionCode::ServerDeviceFailure => 0x04,
        ExceptionCode::Acknowledge => 0x05,
        ExceptionCode::ServerDeviceBusy => 0x06,
        ExceptionCode::MemoryParityError => 0x08,
        ExceptionCode::GatewayPathUnavailable => 0x0A,
        ExceptionCode::GatewayTargetDevice => 0x0B,
        #[allow(unreachable_patterns)]
        _ => 0xFF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_code_mapping() {
        assert_eq!(exception_code_to_u8(ExceptionCode::IllegalFunction), 0x01);
        assert_eq!(exception_code_to_u8(ExceptionCode::IllegalDataAddress), 0x02);
        assert_eq!(exception_code_to_u8(ExceptionCode::GatewayTargetDevice), 0x0B);
    }

    #[test]
    fn test_transport_error_mapping() {
        let limit = Duration::from_secs(1);

        let err = map_modbus_error(
            TokioModbusError::Transport(io::Error::from(io::ErrorKind::TimedOut)),
            limit,
            || "read".to_string(),
        );
        assert!(matches!(err, BusError::Timeout { .. }));

        let err = map_modbus_error(
            TokioModbusError::Transport(io::Error::from(io::ErrorKind::BrokenPipe)),
            limit,
            || "read".to_string(),
        );
        assert!(err.requires_reconnect());
    }
}
