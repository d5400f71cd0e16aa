// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Temperature handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use neasmart_core::dpt9001;
use neasmart_core::types::parse_address;

use crate::error::ApiResult;
use crate::response::{ApiResponse, TemperatureReading, TemperatureWriteAck};
use crate::state::AppState;

/// Body of `PUT /api/v1/temperatures/{address}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WriteTemperatureRequest {
    /// Temperature in °C.
    pub value: f64,
}

/// GET /api/v1/temperatures/{address}
pub async fn read_temperature(
    State(state): State<AppState>,
    Path(address): Path<u32>,
) -> ApiResult<Json<ApiResponse<TemperatureReading>>> {
    let address = parse_address(address)?;
    let read = state
        .manager()
        .read_register(state.slave_id(), address)
        .await?;

    Ok(Json(ApiResponse::success(TemperatureReading {
        address: read.address,
        raw: read.value,
        celsius: dpt9001::decode(read.value),
        origin: read.origin,
    })))
}

/// PUT /api/v1/temperatures/{address}
///
/// Values the codec cannot represent are rejected with 422 before anything
/// is written.
pub async fn write_temperature(
    State(state): State<AppState>,
    Path(address): Path<u32>,
    Json(request): Json<WriteTemperatureRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<TemperatureWriteAck>>)> {
    let address = parse_address(address)?;
    let raw = dpt9001::encode(request.value)?;
    let ack = state
        .manager()
        .write_register(state.slave_id(), address, raw)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(TemperatureWriteAck {
            address: ack.address,
            celsius: dpt9001::decode(raw),
            raw,
            bus_confirmed: ack.bus_confirmed,
        })),
    ))
}
