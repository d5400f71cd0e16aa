// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API handlers for all endpoints.
//!
//! - [`health`]: gateway health
//! - [`registers`]: raw holding registers
//! - [`temperatures`]: DPT 9.001 temperature registers
//! - [`sync`]: batch synchronization from the bus

mod health;
mod registers;
mod sync;
mod temperatures;

pub use health::*;
pub use registers::*;
pub use sync::*;
pub use temperatures::*;
