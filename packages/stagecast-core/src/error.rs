//! Centralized error types for the Stagecast core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the Stagecast server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum StageError {
    /// Requested room does not exist.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Room exists but is not public.
    #[error("Room is private: {0}")]
    RoomPrivate(String),

    /// Caller does not host the room they are mutating.
    #[error("Not the host of this room")]
    NotHost,

    /// Caller has no hosted room to return to / act on.
    #[error("No hosted room")]
    NoHostedRoom,

    /// Caller already has a pending suggestion in this room.
    #[error("Already have a pending suggestion")]
    AlreadySuggesting,

    /// Requested upload does not exist.
    #[error("Upload not found: {0}")]
    UploadNotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An external collaborator (analysis, synthesis, source resolution) failed.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error (missing required settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ErrorCode for StageError {
    fn code(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) => "room_not_found",
            Self::RoomPrivate(_) => "room_private",
            Self::NotHost => "not_host",
            Self::NoHostedRoom => "no_hosted_room",
            Self::AlreadySuggesting => "already_suggesting",
            Self::UploadNotFound(_) => "upload_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ExternalService(_) => "external_service_error",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

impl StageError {
    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RoomNotFound(_) | Self::UploadNotFound(_) => StatusCode::NOT_FOUND,
            Self::RoomPrivate(_) | Self::NotHost => StatusCode::FORBIDDEN,
            Self::NoHostedRoom
            | Self::AlreadySuggesting
            | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ExternalService(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type StageResult<T> = Result<T, StageError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for StageError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_not_found_returns_correct_code() {
        let err = StageError::RoomNotFound("abc123".into());
        assert_eq!(err.code(), "room_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn not_host_is_forbidden() {
        let err = StageError::NotHost;
        assert_eq!(err.code(), "not_host");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn external_service_maps_to_bad_gateway() {
        let err = StageError::ExternalService("analysis endpoint unreachable".into());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
