// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Raw register handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use neasmart_core::types::parse_address;
use neasmart_modbus::{RegisterRead, WriteAck};

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Body of `PUT /api/v1/registers/{address}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WriteRegisterRequest {
    /// Raw register value.
    pub value: u16,
}

/// GET /api/v1/registers/{address}
pub async fn read_register(
    State(state): State<AppState>,
    Path(address): Path<u32>,
) -> ApiResult<Json<ApiResponse<RegisterRead>>> {
    let address = parse_address(address)?;
    let read = state
        .manager()
        .read_register(state.slave_id(), address)
        .await?;
    Ok(Json(ApiResponse::success(read)))
}

/// PUT /api/v1/registers/{address}
///
/// 202: the value is stored; `bus_confirmed` says whether the bus took it.
pub async fn write_register(
    State(state): State<AppState>,
    Path(address): Path<u32>,
    Json(request): Json<WriteRegisterRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<WriteAck>>)> {
    let address = parse_address(address)?;
    let ack = state
        .manager()
        .write_register(state.slave_id(), address, request.value)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(ack))))
}
