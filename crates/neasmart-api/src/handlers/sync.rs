// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Batch sync handler.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use neasmart_core::error::ValidationError;
use neasmart_core::types::{RegisterRange, parse_address};
use neasmart_modbus::SyncReport;

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Body of `POST /api/v1/sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SyncRequest {
    /// `{ "start": 0, "count": 100 }`
    Range {
        /// First address.
        start: u32,
        /// Number of registers.
        count: u32,
    },
    /// `{ "addresses": [1, 5, 9] }`
    Addresses {
        /// Explicit addresses.
        addresses: Vec<u32>,
    },
}

impl SyncRequest {
    /// Converts the body into a validated range.
    pub fn to_range(&self) -> Result<RegisterRange, ValidationError> {
        match self {
            SyncRequest::Range { start, count } => {
                let invalid = || ValidationError::InvalidRange {
                    start: *start,
                    count: *count,
                };
                let start = u16::try_from(*start).map_err(|_| invalid())?;
                RegisterRange::contiguous(start, *count)
            }
            SyncRequest::Addresses { addresses } => {
                let addresses = addresses
                    .iter()
                    .map(|a| parse_address(*a))
                    .collect::<Result<Vec<_>, _>>()?;
                RegisterRange::addresses(addresses)
            }
        }
    }
}

/// POST /api/v1/sync
pub async fn sync_registers(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> ApiResult<Json<ApiResponse<SyncReport>>> {
    let range = request.to_range()?;
    let report = state
        .manager()
        .batch_sync_from_bus(state.slave_id(), &range)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_request_shapes() {
        let request: SyncRequest = serde_json::from_str(r#"{"start": 10, "count": 5}"#).unwrap();
        assert_eq!(
            request.to_range().unwrap(),
            RegisterRange::Contiguous { start: 10, count: 5 }
        );

        let request: SyncRequest = serde_json::from_str(r#"{"start": 0, "count": 65536}"#).unwrap();
        assert_eq!(request.to_range().unwrap(), RegisterRange::all());

        let request: SyncRequest = serde_json::from_str(r#"{"addresses": [9, 1, 9]}"#).unwrap();
        assert_eq!(
            request.to_range().unwrap(),
            RegisterRange::Addresses(vec![1, 9])
        );
    }

    #[test]
    fn test_sync_request_rejects_bad_ranges() {
        let overflow = SyncRequest::Range { start: 65_530, count: 10 };
        assert!(overflow.to_range().is_err());

        let wide = SyncRequest::Range { start: 70_000, count: 1 };
        assert!(wide.to_range().is_err());

        let past_end = SyncRequest::Range { start: 1, count: 65_536 };
        assert!(past_end.to_range().is_err());

        let empty = SyncRequest::Addresses { addresses: vec![] };
        assert!(empty.to_range().is_err());

        let bad = SyncRequest::Addresses { addresses: vec![1, 65_536] };
        assert!(matches!(
            bad.to_range(),
            Err(ValidationError::InvalidAddress { address: 65_536 })
        ));
    }
}
