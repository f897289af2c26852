//! Centralized error types for Parley.
//!
//! Uses `thiserror` for ergonomic error definitions and provides HTTP-friendly
//! error variants that can be directly converted to API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

/// Core application error type used across all Parley services.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    // === Auth errors ===
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid token")]
    InvalidToken,

    // === Resource errors ===
    #[error("{resource} not found")]
    NotFound { resource: String },

    // === Validation errors ===
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // === Call aggregate errors ===
    #[error("Already in call")]
    AlreadyInCall,

    #[error("Call is full")]
    CallFull,

    #[error("Not in call")]
    NotInCall,

    #[error("Call has ended")]
    CallEnded,

    // === Signaling fast path ===
    // Never surfaced to a remote party: the router drops the event and the
    // caller logs at debug. Carried as an error so call sites can't ignore
    // the distinction between "delivered" and "nobody home" by accident.
    #[error("Signaling target {user_id} has no registered connection")]
    TargetOffline { user_id: Uuid },

    // === Transport ===
    #[error("Transport setup toward {remote} failed: {reason}")]
    TransportSetupFailed { remote: Uuid, reason: String },

    // === Infrastructure ===
    #[error("Call store unavailable: {message}")]
    PersistenceUnavailable { message: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body sent to clients.
#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    error: String,
    message: String,
}

impl ParleyError {
    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Validation { .. } | Self::NotInCall => StatusCode::BAD_REQUEST,
            Self::AlreadyInCall => StatusCode::CONFLICT,
            Self::CallFull => StatusCode::FORBIDDEN,
            Self::CallEnded => StatusCode::GONE,
            Self::TargetOffline { .. } => StatusCode::NOT_FOUND,
            Self::TransportSetupFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::PersistenceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error code string for programmatic handling by clients.
    pub fn error_code(&self) -> &str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::AlreadyInCall => "ALREADY_IN_CALL",
            Self::CallFull => "CALL_FULL",
            Self::NotInCall => "NOT_IN_CALL",
            Self::CallEnded => "CALL_ENDED",
            Self::TargetOffline { .. } => "TARGET_OFFLINE",
            Self::TransportSetupFailed { .. } => "TRANSPORT_SETUP_FAILED",
            Self::PersistenceUnavailable { .. } => "PERSISTENCE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ParleyError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak internal details to clients
        let message = match &self {
            ParleyError::Internal(e) => {
                tracing::error!("Internal error: {e}");
                "An internal error occurred".to_string()
            }
            ParleyError::PersistenceUnavailable { message } => {
                tracing::error!("Call store unavailable: {message}");
                "Call store temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            code: status.as_u16(),
            error: self.error_code().to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results using ParleyError.
pub type ParleyResult<T> = Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_errors_map_to_distinct_statuses() {
        assert_eq!(ParleyError::AlreadyInCall.status_code(), StatusCode::CONFLICT);
        assert_eq!(ParleyError::CallFull.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ParleyError::NotInCall.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ParleyError::CallEnded.status_code(), StatusCode::GONE);
        assert_eq!(
            ParleyError::PersistenceUnavailable { message: "down".into() }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ParleyError::AlreadyInCall.error_code(), "ALREADY_IN_CALL");
        assert_eq!(
            ParleyError::TargetOffline { user_id: Uuid::nil() }.error_code(),
            "TARGET_OFFLINE"
        );
    }
}
