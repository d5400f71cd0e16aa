// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus TCP server exposing the register context.
//!
//! The Neasmart is the Modbus master; the gateway answers as a slave.
//!
//! | Function | Code | Handling                                   |
//! |----------|------|--------------------------------------------|
//! | 0x03     | FC03 | read from the register context             |
//! | 0x06     | FC06 | [`ModbusManager::apply_remote_write`]      |
//! | 0x10     | FC16 | [`ModbusManager::apply_remote_write`]      |
//! | other    |      | `IllegalFunction`                          |

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::{Server, accept_tcp_connection};
use tracing::{debug, error, info, warn};

use crate::error::{ManagerError, ManagerResult};
use crate::manager::ModbusManager;
use crate::types::{MAX_READ_COUNT, ServerConfig};

type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response, ExceptionCode>> + Send>>;

/// Per-connection request handler.
#[derive(Debug, Clone)]
pub struct RegisterService {
    manager: Arc<ModbusManager>,
}

impl RegisterService {
    /// Creates a service over `manager`.
    pub fn new(manager: Arc<ModbusManager>) -> Self {
        Self { manager }
    }

    fn read(&self, address: u16, count: u16) -> Result<Vec<u16>, ExceptionCode> {
        if count == 0 || count > MAX_READ_COUNT {
            return Err(ExceptionCode::IllegalDataValue);
        }
        self.manager
            .context()
            .read(address, count)
            .map_err(|_| ExceptionCode::IllegalDataAddress)
    }
}

fn exception_for(error: &ManagerError) -> ExceptionCode {
    match error {
        ManagerError::Validation(_) => ExceptionCode::IllegalDataAddress,
        _ => ExceptionCode::ServerDeviceFailure,
    }
}

impl tokio_modbus::server::Service for RegisterService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = ServiceFuture;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!(request = ?req, "Received Modbus request");

        match req {
            Request::ReadHoldingRegisters(address, count) => {
                let res = self.read(address, count).map(Response::ReadHoldingRegisters);
                Box::pin(std::future::ready(res))
            }
            Request::WriteSingleRegister(address, value) => {
                let manager = self.manager.clone();
                Box::pin(async move {
                    manager
                        .apply_remote_write(address, &[value])
                        .await
                        .map(|()| Response::WriteSingleRegister(address, value))
                        .map_err(|e| {
                            warn!(address, value, error = %e, "Remote register write failed");
                            exception_for(&e)
                        })
                })
            }
            Request::WriteMultipleRegisters(address, values) => {
                let manager = self.manager.clone();
                let values = values.into_owned();
                Box::pin(async move {
                    manager
                        .apply_remote_write(address, &values)
                        .await
                        .map(|()| Response::WriteMultipleRegisters(address, values.len() as u16))
                        .map_err(|e| {
                            warn!(address, count = values.len(), error = %e, "Remote register write failed");
                            exception_for(&e)
                        })
                })
            }
            _ => {
                debug!("Unsupported Modbus function");
                Box::pin(std::future::ready(Err(ExceptionCode::IllegalFunction)))
            }
        }
    }
}

/// Modbus TCP server bound to a listener.
pub struct ModbusServer {
    listener: TcpListener,
    manager: Arc<ModbusManager>,
}

impl ModbusServer {
    /// Binds the server described by `config`.
    pub async fn bind(config: &ServerConfig, manager: Arc<ModbusManager>) -> ManagerResult<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ManagerError::server(format!("failed to bind {addr}: {e}")))?;
        Ok(Self::from_listener(listener, manager))
    }

    /// Wraps an already bound listener.
    pub fn from_listener(listener: TcpListener, manager: Arc<ModbusManager>) -> Self {
        Self { listener, manager }
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> ManagerResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| ManagerError::server(e.to_string()))
    }

    /// Serves connections until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> ManagerResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let local_addr = self.local_addr()?;
        let slave_id = self.manager.slave_id();
        let service = RegisterService::new(self.manager);
        let server = Server::new(self.listener);

        let on_connected = move |stream, socket_addr: SocketAddr| {
            let service = service.clone();
            async move {
                debug!(peer = %socket_addr, "Modbus client connected");
                accept_tcp_connection(stream, socket_addr, move |_| Ok(Some(service.clone())))
            }
        };
        let on_process_error = |err| {
            error!(error = %err, "Modbus connection error");
        };

        info!(address = %local_addr, slave_id = %slave_id, "Modbus server listening");

        tokio::select! {
            result = server.serve(&on_connected, on_process_error) => {
                result.map_err(|e| ManagerError::server(e.to_string()))
            }
            () = shutdown => {
                info!("Modbus server stopped");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for ModbusServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("slave_id", &self.manager.slave_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use tokio_modbus::server::Service;

    use neasmart_core::retry::RetryConfig;
    use neasmart_store::{MemoryFallback, PersistentRegisterStore, StoreConfig};

    use crate::types::ManagerConfig;

    fn service() -> RegisterService {
        let config = StoreConfig::builder().retry(RetryConfig::immediate(1)).build();
        let store = Arc::new(PersistentRegisterStore::new(
            Arc::new(MemoryFallback::new()),
            config,
        ));
        RegisterService::new(Arc::new(ModbusManager::local(ManagerConfig::default(), store)))
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let service = service();

        let res = service
            .call(Request::WriteMultipleRegisters(10, Cow::Owned(vec![1, 2, 3])))
            .await
            .unwrap();
        assert_eq!(res, Response::WriteMultipleRegisters(10, 3));

        let res = service.call(Request::WriteSingleRegister(11, 20)).await.unwrap();
        assert_eq!(res, Response::WriteSingleRegister(11, 20));

        let res = service.call(Request::ReadHoldingRegisters(10, 3)).await.unwrap();
        assert_eq!(res, Response::ReadHoldingRegisters(vec![1, 20, 3]));
        assert_eq!(service.manager.store().get(12).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_read_past_end_is_illegal_address() {
        let service = service();
        let err = service
            .call(Request::ReadHoldingRegisters(65_535, 2))
            .await
            .unwrap_err();
        assert_eq!(err, ExceptionCode::IllegalDataAddress);
    }

    #[tokio::test]
    async fn test_unsupported_function() {
        let service = service();
        let err = service.call(Request::ReadCoils(0, 1)).await.unwrap_err();
        assert_eq!(err, ExceptionCode::IllegalFunction);

        let err = service
            .call(Request::ReadHoldingRegisters(0, 0))
            .await
            .unwrap_err();
        assert_eq!(err, ExceptionCode::IllegalDataValue);
    }
}
