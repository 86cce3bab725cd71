//! Error types for Baanboard services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for the listing pipeline's failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Message shown to end users for any server-side failure
pub const GENERIC_USER_MESSAGE: &str = "Something went wrong. Please try again.";

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationFailed,
    PayloadTooLarge,
    UnsupportedMediaType,

    // Authentication errors (2xxx)
    Unauthorized,
    InvalidToken,
    ExpiredToken,

    // Authorization errors (3xxx)
    NotOwned,
    PremiumRequired,

    // Resource errors (4xxx)
    NotFound,

    // Request lifecycle (5xxx)
    Cancelled,
    RateLimited,

    // Database errors (7xxx)
    QueryFailed,
    PartialWriteFailed,
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationFailed => 1001,
            ErrorCode::PayloadTooLarge => 1002,
            ErrorCode::UnsupportedMediaType => 1003,

            ErrorCode::Unauthorized => 2001,
            ErrorCode::InvalidToken => 2002,
            ErrorCode::ExpiredToken => 2003,

            ErrorCode::NotOwned => 3001,
            ErrorCode::PremiumRequired => 3002,

            ErrorCode::NotFound => 4001,

            ErrorCode::Cancelled => 5001,
            ErrorCode::RateLimited => 5002,

            ErrorCode::QueryFailed => 7001,
            ErrorCode::PartialWriteFailed => 7002,
            ErrorCode::DatabaseError => 7003,
            ErrorCode::ConnectionError => 7004,

            ErrorCode::UpstreamError => 8001,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Sub-step of a multi-step listing write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStep {
    Locations,
    Amenities,
    Tags,
    Bedrooms,
    Images,
    Archive,
    Delete,
    Commit,
}

impl WriteStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStep::Locations => "locations",
            WriteStep::Amenities => "amenities",
            WriteStep::Tags => "tags",
            WriteStep::Bedrooms => "bedrooms",
            WriteStep::Images => "images",
            WriteStep::Archive => "archive",
            WriteStep::Delete => "delete",
            WriteStep::Commit => "commit",
        }
    }
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed on {field}: {message}")]
    ValidationFailed { field: String, message: String },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unsupported media type: {content_type}")]
    UnsupportedMediaType { content_type: String },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid session token")]
    InvalidToken,

    #[error("Session token expired")]
    ExpiredToken,

    // Authorization errors
    #[error("Listing {id} is owned by another agent")]
    NotOwned { id: String },

    #[error("Premium subscription required")]
    PremiumRequired,

    // Resource errors
    #[error("Resource not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    // Request lifecycle
    #[error("Request cancelled")]
    Cancelled,

    #[error("Rate limit exceeded")]
    RateLimited,

    // Store errors
    #[error("Query failed: {cause}")]
    QueryFailed { cause: String },

    #[error("Partial write failed at {step} for listing {listing_id}: {message}")]
    PartialWriteFailed {
        step: WriteStep,
        listing_id: String,
        rolled_back: bool,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Upstream service error: {message}")]
    Upstream { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a field-level validation failure
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a missing resource
    pub fn not_found(resource: impl Into<String>, id: impl fmt::Display) -> Self {
        AppError::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Wrap a store failure as a query failure, keeping cancellation intact
    pub fn query_failed(err: AppError) -> Self {
        match err {
            AppError::Cancelled => AppError::Cancelled,
            err @ AppError::QueryFailed { .. } => err,
            other => AppError::QueryFailed {
                cause: other.to_string(),
            },
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::UnsupportedMediaType { .. } => ErrorCode::UnsupportedMediaType,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::InvalidToken => ErrorCode::InvalidToken,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::NotOwned { .. } => ErrorCode::NotOwned,
            AppError::PremiumRequired => ErrorCode::PremiumRequired,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::Cancelled => ErrorCode::Cancelled,
            AppError::RateLimited => ErrorCode::RateLimited,
            AppError::QueryFailed { .. } => ErrorCode::QueryFailed,
            AppError::PartialWriteFailed { .. } => ErrorCode::PartialWriteFailed,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Upstream { .. } | AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. } |
            AppError::InvalidToken |
            AppError::ExpiredToken => StatusCode::UNAUTHORIZED,

            // 402 Payment Required
            AppError::PremiumRequired => StatusCode::PAYMENT_REQUIRED,

            // 403 Forbidden
            AppError::NotOwned { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 415 Unsupported Media Type
            AppError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,

            // 429 Too Many Requests
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            // 499 Client Closed Request
            AppError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
            }

            // 500 Internal Server Error
            AppError::QueryFailed { .. } |
            AppError::PartialWriteFailed { .. } |
            AppError::Database(_) |
            AppError::Internal { .. } |
            AppError::Configuration { .. } |
            AppError::Serialization(_) |
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Upstream { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::DatabaseConnection { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }

    /// Message safe to show to an end user.
    ///
    /// Client errors describe themselves; server-side failures collapse into
    /// one generic message so store internals never leak to the UI.
    pub fn user_message(&self) -> String {
        if self.is_server_error() {
            GENERIC_USER_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        match &self {
            AppError::Cancelled => {
                tracing::debug!("Request cancelled before completion");
            }
            AppError::PartialWriteFailed { step, listing_id, rolled_back, .. } => {
                tracing::error!(
                    error = %message,
                    step = %step,
                    listing_id = %listing_id,
                    rolled_back = *rolled_back,
                    "Listing write left incomplete"
                );
            }
            _ if self.is_server_error() => {
                tracing::error!(
                    error = %message,
                    code = ?code,
                    status = status.as_u16(),
                    "Server error"
                );
            }
            _ if self.is_client_error() => {
                tracing::warn!(
                    error = %message,
                    code = ?code,
                    status = status.as_u16(),
                    "Client error"
                );
            }
            _ => {}
        }

        let field = match &self {
            AppError::ValidationFailed { field, .. } => Some(field.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message: self.user_message(),
                field,
                request_id: None, // Filled by the request-id layer
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::not_found("listing", "abc");
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = AppError::NotOwned { id: "abc".into() };
        assert_eq!(err.code(), ErrorCode::NotOwned);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::validation("bathroom_count", "must be greater than zero");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
        assert!(err.user_message().contains("bathroom_count"));
    }

    #[test]
    fn test_partial_write_hides_detail_from_users() {
        let err = AppError::PartialWriteFailed {
            step: WriteStep::Tags,
            listing_id: "l-1".into(),
            rolled_back: true,
            message: "duplicate key value violates unique constraint".into(),
        };
        assert!(err.is_server_error());
        assert_eq!(err.user_message(), GENERIC_USER_MESSAGE);
        assert!(err.to_string().contains("tags"));
    }

    #[test]
    fn test_query_failed_preserves_cancellation() {
        assert!(AppError::query_failed(AppError::Cancelled).is_cancelled());

        let wrapped = AppError::query_failed(AppError::Internal { message: "boom".into() });
        assert_eq!(wrapped.code(), ErrorCode::QueryFailed);
    }

    #[test]
    fn test_cancelled_status() {
        assert_eq!(AppError::Cancelled.status_code().as_u16(), 499);
    }
}
