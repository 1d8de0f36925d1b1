//! Unified error types for the analytics pipeline.
//!
//! Tracking error codes:
//! - TRACK_001-003: Tracking request errors
//! - DB_001: Persistence errors

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Tracking error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackErrorCode {
    /// TRACK_001: event_type is missing or not recognized
    InvalidEventType,
    /// TRACK_002: tracking cookies not found (client should retry)
    MissingCookies,
    /// TRACK_003: post does not exist
    UnknownPost,
}

impl TrackErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEventType => "TRACK_001",
            Self::MissingCookies => "TRACK_002",
            Self::UnknownPost => "TRACK_003",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidEventType => 400,
            Self::MissingCookies => 400,
            Self::UnknownPost => 404,
        }
    }

    /// Whether the client is expected to retry after a short delay.
    ///
    /// Only applies to missing cookies: they may not have propagated on the
    /// first request after a fresh page load.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::MissingCookies)
    }
}

/// Persistence error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorCode {
    /// DB_001: Failed to persist tracking data
    WriteFailed,
}

impl DbErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WriteFailed => "DB_001",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        500
    }
}

/// Unified error type for the analytics pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Tracking error with code.
    #[error("[{code}] {message}")]
    Track {
        code: &'static str,
        message: String,
        http_status: u16,
        retryable: bool,
    },

    /// Persistence error with code.
    #[error("[{code}] {message}")]
    Database {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a tracking error.
    pub fn track(code: TrackErrorCode, msg: impl Into<String>) -> Self {
        Self::Track {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
            retryable: code.is_retryable(),
        }
    }

    /// Create a persistence error.
    pub fn database(code: DbErrorCode, msg: impl Into<String>) -> Self {
        Self::Database {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    pub fn invalid_event_type(ty: impl std::fmt::Display) -> Self {
        Self::track(
            TrackErrorCode::InvalidEventType,
            format!("Unknown event type: {}", ty),
        )
    }

    pub fn missing_cookies() -> Self {
        Self::track(
            TrackErrorCode::MissingCookies,
            "Tracking cookies not found",
        )
    }

    pub fn unknown_post(id: impl std::fmt::Display) -> Self {
        Self::track(TrackErrorCode::UnknownPost, format!("Post not found: {}", id))
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::database(DbErrorCode::WriteFailed, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Track { http_status, .. } => *http_status,
            Self::Database { http_status, .. } => *http_status,
            Self::Validation(_) => 400,
            Self::Serialization(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Track { code, .. } => Some(code),
            Self::Database { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the caller should treat this as transient and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Track { retryable: true, .. })
    }
}
