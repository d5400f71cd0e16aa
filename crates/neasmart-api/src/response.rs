// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API response types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use neasmart_core::types::ValueOrigin;
use neasmart_modbus::ManagerHealth;

// =============================================================================
// ApiResponse
// =============================================================================

/// JSON envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the operation was successful.
    pub success: bool,
    /// Response data (if successful).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Creates a successful response with data.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

// =============================================================================
// Typed Responses
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    /// Version string.
    pub version: String,
    /// Seconds since the API state was created.
    pub uptime_seconds: u64,
    /// Manager health.
    pub gateway: ManagerHealth,
}

impl HealthResponse {
    /// Builds the response from a manager health snapshot.
    pub fn from_health(gateway: ManagerHealth, uptime_seconds: u64) -> Self {
        let status = if gateway.is_degraded() { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            version: crate::VERSION.to_string(),
            uptime_seconds,
            gateway,
        }
    }
}

/// Temperature register decoded with DPT 9.001.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemperatureReading {
    /// Register address.
    pub address: u16,
    /// Raw register value.
    pub raw: u16,
    /// Decoded temperature in °C.
    pub celsius: f64,
    /// Whether the value came from the bus or the store.
    pub origin: ValueOrigin,
}

/// Result of a temperature write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemperatureWriteAck {
    /// Register address.
    pub address: u16,
    /// Temperature as stored after encoding.
    pub celsius: f64,
    /// Encoded register value.
    pub raw: u16,
    /// `false` when the bus write failed or was short-circuited.
    pub bus_confirmed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success(42);
        assert!(response.success);
        assert_eq!(response.data, Some(42));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_api_response_error_omits_data() {
        let response: ApiResponse<()> = ApiResponse::error("Register store unavailable");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
        assert_eq!(json["error"], "Register store unavailable");
    }
}
