//! Error types for qibla computation and the capabilities feeding it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a location fix could not be produced.
///
/// The first three mirror the platform geolocation error codes. `Unsupported`
/// covers a missing capability altogether and `InvalidCoordinate` a fix that
/// arrived but lies outside the valid coordinate range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationErrorCode {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Unsupported,
    InvalidCoordinate,
}

impl fmt::Display for LocationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LocationErrorCode::PermissionDenied => "permission denied",
            LocationErrorCode::PositionUnavailable => "position unavailable",
            LocationErrorCode::Timeout => "timeout",
            LocationErrorCode::Unsupported => "unsupported",
            LocationErrorCode::InvalidCoordinate => "invalid coordinate",
        };
        f.write_str(name)
    }
}

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum QiblaError {
    /// Latitude or longitude outside the valid range (or not finite)
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// No location fix could be obtained
    #[error("Location unavailable ({code}): {message}")]
    LocationUnavailable {
        code: LocationErrorCode,
        message: String,
    },

    /// Orientation capability absent or denied
    #[error("Orientation unavailable: {0}")]
    OrientationUnavailable(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QiblaError {
    pub fn location(code: LocationErrorCode, message: impl Into<String>) -> Self {
        QiblaError::LocationUnavailable {
            code,
            message: message.into(),
        }
    }

    /// Get an error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            QiblaError::InvalidCoordinate { .. } => "INVALID_COORDINATE",
            QiblaError::LocationUnavailable { .. } => "LOCATION_UNAVAILABLE",
            QiblaError::OrientationUnavailable(_) => "ORIENTATION_UNAVAILABLE",
            QiblaError::Config(_) => "INVALID_CONFIG",
            QiblaError::Io(_) => "IO_ERROR",
            QiblaError::Json(_) => "JSON_ERROR",
        }
    }

    /// Condensed, cloneable form suitable for publishing to listeners.
    pub fn to_failure(&self) -> LocationFailure {
        match self {
            QiblaError::LocationUnavailable { code, message } => LocationFailure {
                code: *code,
                message: message.clone(),
            },
            QiblaError::InvalidCoordinate { .. } => LocationFailure {
                code: LocationErrorCode::InvalidCoordinate,
                message: self.to_string(),
            },
            other => LocationFailure {
                code: LocationErrorCode::PositionUnavailable,
                message: other.to_string(),
            },
        }
    }
}

/// A reported location failure, as seen by snapshot consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFailure {
    pub code: LocationErrorCode,
    pub message: String,
}

impl fmt::Display for LocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Result type alias for qibla operations
pub type Result<T> = std::result::Result<T, QiblaError>;
