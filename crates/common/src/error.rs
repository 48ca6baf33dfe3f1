//! Error types for souk-rs.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
///
/// Guard failures carry dedicated variants so callers can branch on the
/// typed code rather than matching message text.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // === Order/Chat Guard Failures ===
    #[error("Only the {0} may perform this transition")]
    ForbiddenRole(&'static str),

    #[error("Order is already confirmed")]
    AlreadyConfirmed,

    #[error("Order is already completed")]
    AlreadyCompleted,

    #[error("Conversation has no attached order")]
    NoOrder,

    #[error("Order has not been confirmed yet")]
    OrderNotConfirmed,

    #[error("Conversation is closed or deleted by the sender")]
    ChatInactive,

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::ForbiddenRole(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_)
            | Self::AlreadyConfirmed
            | Self::AlreadyCompleted
            | Self::NoOrder
            | Self::OrderNotConfirmed
            | Self::ChatInactive => StatusCode::CONFLICT,

            // 5xx Server Errors
            Self::Database(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the stable error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::ForbiddenRole(_) => "FORBIDDEN_ROLE",
            Self::AlreadyConfirmed => "ALREADY_CONFIRMED",
            Self::AlreadyCompleted => "ALREADY_COMPLETED",
            Self::NoOrder => "NO_ORDER",
            Self::OrderNotConfirmed => "ORDER_NOT_CONFIRMED",
            Self::ChatInactive => "CHAT_INACTIVE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_failures_map_to_conflict() {
        assert_eq!(AppError::AlreadyConfirmed.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::AlreadyCompleted.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::ChatInactive.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::NoOrder.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn guard_failures_carry_stable_codes() {
        assert_eq!(AppError::AlreadyConfirmed.error_code(), "ALREADY_CONFIRMED");
        assert_eq!(AppError::ForbiddenRole("seller").error_code(), "FORBIDDEN_ROLE");
        assert_eq!(AppError::ChatInactive.error_code(), "CHAT_INACTIVE");
        assert_eq!(AppError::OrderNotConfirmed.error_code(), "ORDER_NOT_CONFIRMED");
    }

    #[test]
    fn ownership_failures_stay_generic() {
        // Acting on someone else's notification must not leak existence.
        let err = AppError::NotFound("notification".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "NOT_FOUND");
    }
}
