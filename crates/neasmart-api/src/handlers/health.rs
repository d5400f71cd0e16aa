// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Health check handler.

use axum::{Json, extract::State};

use crate::response::{ApiResponse, HealthResponse};
use crate::state::AppState;

/// GET /health
///
/// Always 200. A degraded gateway still serves cached values, so the state is
/// reported in `status` rather than through the status code.
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let gateway = state.manager().health().await;
    if gateway.is_degraded() {
        tracing::debug!(
            circuit_state = ?gateway.circuit_state,
            using_fallback = gateway.using_fallback,
            "Health check reports degraded gateway"
        );
    }
    Json(ApiResponse::success(HealthResponse::from_health(
        gateway,
        state.uptime_seconds(),
    )))
}
