// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! API error types and handling.
//!
//! | Error                      | Status |
//! |----------------------------|--------|
//! | bad address / range / body | 400    |
//! | temperature out of range   | 422    |
//! | store unavailable          | 503    |
//! | bus timeout                | 504    |

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use neasmart_core::error::{CodecError, ValidationError};
use neasmart_modbus::ManagerError;

use crate::response::ApiResponse;

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// ApiError
// =============================================================================

/// API error type with HTTP status code mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request (400).
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message.
        message: String,
    },

    /// Service unavailable (503).
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        /// Error message.
        message: String,
    },

    /// Internal server error (500).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message (for logging, not user-facing).
        message: String,
    },

    /// Error raised by the register manager.
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

impl ApiError {
    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a service unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Manager(e) => StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Returns the error code for categorization.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { .. } => "BAD_REQUEST",
            ApiError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            ApiError::Internal { .. } => "INTERNAL_ERROR",
            ApiError::Manager(ManagerError::Validation(_)) => "VALIDATION_ERROR",
            ApiError::Manager(ManagerError::Codec(_)) => "CODEC_ERROR",
            ApiError::Manager(ManagerError::Store(_)) => "STORE_UNAVAILABLE",
            ApiError::Manager(ManagerError::CircuitOpen) => "CIRCUIT_OPEN",
            ApiError::Manager(ManagerError::Bus(_)) => "BUS_ERROR",
            ApiError::Manager(ManagerError::Server { .. }) => "SERVER_ERROR",
        }
    }

    /// Returns a message safe to show to API clients.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Internal { .. } => "Internal server error".to_string(),
            ApiError::Manager(ManagerError::Store(_)) => {
                "Register store is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Returns `true` if this error should be logged at error level.
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Manager(ManagerError::Validation(err))
    }
}

impl From<CodecError> for ApiError {
    fn from(err: CodecError) -> Self {
        ApiError::Manager(ManagerError::Codec(err))
    }
}

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        if self.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = error_code,
                status = %status,
                "Server error occurred"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = error_code,
                status = %status,
                "Client error occurred"
            );
        }

        let body: ApiResponse<()> = ApiResponse::error(self.user_message());
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Tests
// =============================================================================
