// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! Runs a [`ModbusServer`] on an ephemeral port so tests can talk to the
//! gateway over a real socket, then stops it on [`TestServer::stop`] or drop.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use neasmart_modbus::{ManagerResult, ModbusServer, ServerConfig, SharedManager, TcpBusConfig};

/// A Modbus server bound to `127.0.0.1:0`.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    manager: SharedManager,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<ManagerResult<()>>>,
}

impl TestServer {
    /// Starts serving `manager`'s register context.
    pub async fn start(manager: SharedManager) -> Self {
        let config = ServerConfig {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            port: 0,
        };
        let server = ModbusServer::bind(&config, manager.clone())
            .await
            .expect("Failed to bind test Modbus server");
        let addr = server.local_addr().expect("Bound server has an address");

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            manager,
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    /// Address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Manager behind the server.
    pub fn manager(&self) -> &SharedManager {
        &self.manager
    }

    /// Client bus configuration pointing at this server.
    pub fn bus_config(&self) -> TcpBusConfig {
        TcpBusConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            connect_timeout: Duration::from_secs(1),
            operation_timeout: Duration::from_secs(1),
        }
    }

    /// Stops the server and waits for it to finish.
    pub async fn stop(mut self) -> ManagerResult<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.handle.take() {
            Some(handle) => tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("Modbus server did not stop")
                .expect("Modbus server task panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
