// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Gateway runtime orchestration.
//!
//! Startup order:
//!
//! 1. Open the register store (SQLite, or the in-memory fallback)
//! 2. Build the bus and the manager around one register context
//! 3. Seed the context from the store
//! 4. Optional startup batch sync
//! 5. Modbus server and REST API
//! 6. Wait for SIGINT/SIGTERM, stop the servers, drain the fallback

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use neasmart_api::{ApiServer, ApiServerConfig, AppState};
use neasmart_config::{ConfigLoader, NeasmartConfig};
use neasmart_modbus::{ModbusManager, ModbusServer, RegisterContext, SharedManager, build_bus};
use neasmart_store::PersistentRegisterStore;

use crate::error::{BinError, BinResult};
use crate::shutdown::{ShutdownCoordinator, ShutdownGuard};

/// How long servers get to finish after shutdown is signaled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

type ServerTask = (&'static str, JoinHandle<BinResult<()>>);

// =============================================================================
// GatewayRuntime
// =============================================================================

/// Owns the configuration and runs the gateway until shutdown.
#[derive(Debug)]
pub struct GatewayRuntime {
    config: Arc<NeasmartConfig>,
    shutdown: ShutdownCoordinator,
    startup_sync: bool,
    api: bool,
    server: bool,
}

impl GatewayRuntime {
    /// Creates a new gateway runtime.
    pub fn new(config: NeasmartConfig) -> Self {
        Self {
            startup_sync: config.gateway.sync_on_startup,
            api: config.api.enabled,
            server: config.server.enabled,
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &NeasmartConfig {
        &self.config
    }

    /// Returns the shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Runs the gateway until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        info!(
            version = neasmart_core::VERSION,
            slave_id = %self.config.gateway.slave_id,
            bus = %self.config.modbus.kind,
            "Starting Neasmart gateway"
        );

        let manager = build_manager(&self.config).await?;
        self.prepare(&manager).await?;

        let tasks = self.start_servers(&manager).await?;
        info!("Neasmart gateway is ready");

        self.shutdown.wait_for_shutdown().await?;
        info!("Shutdown initiated, stopping servers");

        let result = join_tasks(tasks).await;
        drain_fallback(&manager).await;

        info!("Neasmart gateway shutdown complete");
        result
    }

    /// Restores the register context and runs the startup sync.
    async fn prepare(&self, manager: &ModbusManager) -> BinResult<()> {
        let restored = manager.restore_context().await?;
        info!(registers = restored, "Register context restored from store");

        if !self.startup_sync {
            return Ok(());
        }

        let range = self.config.gateway.sync_range.to_range()?;
        match manager
            .batch_sync_from_bus(manager.slave_id().get(), &range)
            .await
        {
            Ok(report) => info!(
                synced = report.synced,
                failed = report.failed.len(),
                "Startup sync finished"
            ),
            Err(e) => warn!(error = %e, "Startup sync failed, serving stored values"),
        }
        Ok(())
    }

    /// Binds and spawns the enabled servers. Binding happens here so that a
    /// busy port fails startup instead of a background task.
    async fn start_servers(&self, manager: &SharedManager) -> BinResult<Vec<ServerTask>> {
        let mut tasks = Vec::new();

        if self.server {
            let server = ModbusServer::bind(&self.config.server, manager.clone())
                .await
                .map_err(|e| BinError::from(e).with_context("Starting Modbus server"))?;
            let signal = self.shutdown.shutdown_signal();
            let guard = ShutdownGuard::new(self.shutdown.clone());
            tasks.push((
                "modbus",
                tokio::spawn(async move {
                    let _guard = guard;
                    server.run_until(signal.wait()).await.map_err(BinError::from)
                }),
            ));
        } else {
            info!("Modbus server disabled");
        }

        if self.api {
            let api_config = api_server_config(&self.config);
            let addr = api_config.listen_addr();
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|e| BinError::bind("REST API", addr.clone(), e))?;
            let server = ApiServer::new(AppState::new(api_config, manager.clone()));
            let signal = self.shutdown.shutdown_signal();
            let guard = ShutdownGuard::new(self.shutdown.clone());
            tasks.push((
                "api",
                tokio::spawn(async move {
                    let _guard = guard;
                    server.serve(listener, signal.wait()).await.map_err(BinError::from)
                }),
            ));
        } else {
            info!("REST API disabled");
        }

        Ok(tasks)
    }
}

// =============================================================================
// Component Wiring
// =============================================================================

/// Builds the store, bus and manager described by `config`.
///
/// The manager and the bus share one register context, so a local bus reads
/// exactly what the Modbus server serves.
pub async fn build_manager(config: &NeasmartConfig) -> BinResult<SharedManager> {
    let store = PersistentRegisterStore::open(config.store_config()).await?;
    if store.using_fallback() {
        warn!(
            path = %config.store.database_path.display(),
            "Register store running on in-memory fallback"
        );
    }

    let context = Arc::new(RegisterContext::new(config.gateway.slave_id));
    let bus = build_bus(&config.modbus, context.clone());
    let manager = ModbusManager::with_context(
        config.manager_config(),
        Arc::new(store),
        bus,
        context,
    )?;
    Ok(Arc::new(manager))
}

/// Maps the API section of the gateway configuration.
pub fn api_server_config(config: &NeasmartConfig) -> ApiServerConfig {
    ApiServerConfig::new()
        .with_bind_address(config.api.bind_address.clone())
        .with_port(config.api.port)
        .with_request_timeout(config.api.request_timeout)
}

async fn join_tasks(tasks: Vec<ServerTask>) -> BinResult<()> {
    let mut first_error = None;

    for (name, handle) in tasks {
        let joined = tokio::time::timeout(SHUTDOWN_GRACE, handle)
            .await
            .with_context(|| format!("{name} server did not stop within {SHUTDOWN_GRACE:?}"))
            .and_then(|joined| joined.with_context(|| format!("{name} server task panicked")));

        let outcome = match joined {
            Ok(result) => result,
            Err(e) => Err(BinError::from(e)),
        };
        if let Err(e) = outcome {
            error!(server = name, error = %e, "Server stopped with an error");
            first_error.get_or_insert(e);
        }
    }

    first_error.map_or(Ok(()), Err)
}

/// Tries once to move fallback entries into the durable backend.
async fn drain_fallback(manager: &ModbusManager) {
    let store = manager.store();
    if !store.using_fallback() || store.fallback_len() == 0 {
        return;
    }
    match store.resync_fallback().await {
        Ok(count) => info!(entries = count, "Fallback entries persisted on shutdown"),
        Err(e) => warn!(
            error = %e,
            entries = store.fallback_len(),
            "Fallback entries could not be persisted and will be lost"
        ),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the gateway runtime.
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    config_path: Option<std::path::PathBuf>,
    config: Option<NeasmartConfig>,
    skip_sync: bool,
    no_api: bool,
    no_server: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path.
    pub fn config_path(mut self, path: Option<impl AsRef<Path>>) -> Self {
        self.config_path = path.map(|p| p.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: NeasmartConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Skips the startup sync.
    pub fn skip_sync(mut self, skip: bool) -> Self {
        self.skip_sync = skip;
        self
    }

    /// Disables the REST API.
    pub fn no_api(mut self, disabled: bool) -> Self {
        self.no_api = disabled;
        self
    }

    /// Disables the Modbus server.
    pub fn no_server(mut self, disabled: bool) -> Self {
        self.no_server = disabled;
        self
    }

    /// Builds the runtime, loading the configuration if none was set.
    pub fn build(self) -> BinResult<GatewayRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => ConfigLoader::new()
                .load_or_default(self.config_path.as_deref())
                .map_err(|e| match &self.config_path {
                    Some(path) => BinError::from(e)
                        .with_context(format!("Failed to load {}", path.display())),
                    None => BinError::from(e),
                })?,
        };

        let mut runtime = GatewayRuntime::new(config);
        runtime.startup_sync &= !self.skip_sync;
        runtime.api &= !self.no_api;
        runtime.server &= !self.no_server;
        Ok(runtime)
    }
}

// =============================================================================
// Tests
// =============================================================================
