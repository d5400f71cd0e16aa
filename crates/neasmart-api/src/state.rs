// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use neasmart_modbus::{ModbusManager, SharedManager};

use crate::config::ApiServerConfig;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// API configuration.
    pub config: Arc<ApiServerConfig>,
    /// Register manager.
    pub manager: SharedManager,
    started_at: Instant,
}

impl AppState {
    /// Creates the state around a manager.
    pub fn new(config: ApiServerConfig, manager: SharedManager) -> Self {
        Self {
            config: Arc::new(config),
            manager,
            started_at: Instant::now(),
        }
    }

    /// Returns the register manager.
    pub fn manager(&self) -> &ModbusManager {
        &self.manager
    }

    /// Raw slave id served by the manager.
    pub fn slave_id(&self) -> u8 {
        self.manager.slave_id().get()
    }

    /// Seconds since the state was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl axum::extract::FromRef<AppState> for SharedManager {
    fn from_ref(state: &AppState) -> Self {
        state.manager.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<ApiServerConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
