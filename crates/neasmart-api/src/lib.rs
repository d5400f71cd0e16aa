// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # neasmart-api
//!
//! REST API for the Neasmart gateway.
//!
//! ## Endpoints
//!
//! | Method | Path                             | Handler                 |
//! |--------|----------------------------------|-------------------------|
//! | GET    | `/health`                        | gateway health          |
//! | GET    | `/api/v1/registers/{address}`    | read a raw register     |
//! | PUT    | `/api/v1/registers/{address}`    | write a raw register    |
//! | GET    | `/api/v1/temperatures/{address}` | read a DPT 9.001 value  |
//! | PUT    | `/api/v1/temperatures/{address}` | write a DPT 9.001 value |
//! | POST   | `/api/v1/sync`                   | batch sync from the bus |
//!
//! Every body uses the `{ success, data | error }` envelope.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod server;
pub mod state;

pub use config::{ApiServerConfig, CorsConfig};
pub use error::{ApiError, ApiResult};
pub use response::{ApiResponse, HealthResponse, TemperatureReading, TemperatureWriteAck};
pub use server::ApiServer;
pub use state::AppState;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
