//! Centralized error types for the WildFire application.
//!
//! This module provides a typed error hierarchy that:
//! - Enables precise error handling throughout the codebase
//! - Provides user-friendly messages suitable for display
//! - Preserves full error context for debugging/logging

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a display-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fire risk error: {0}")]
    Risk(#[from] RiskServiceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Storage(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Risk(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => {
                "Unable to connect. Check your internet connection."
            }
            NetworkError::Timeout => "The request timed out. Please try again.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The server is experiencing issues. Please try again later."
            }
            NetworkError::ServerError { .. } => "The request failed. Please try again.",
            NetworkError::InvalidResponse(_) => {
                "Received an unexpected response. Please try again."
            }
        }
    }
}

/// Local storage errors (SQLite key/value store).
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Storage open failed: {0}")]
    OpenFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),
}

impl StorageError {
    pub fn user_message(&self) -> &'static str {
        match self {
            StorageError::OpenFailed(_) => "Unable to access local data. Try restarting the app.",
            StorageError::QueryFailed(_) => "A data operation failed. Please try again.",
            StorageError::Corruption(_) => {
                "Local data may be corrupted. Consider clearing the cache."
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration not found. Using defaults.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Fire risk service errors as seen by the application layer.
#[derive(Debug, Error)]
pub enum RiskServiceError {
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Location needs manual entry")]
    NeedsManualEntry,

    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("No fire risk data available: {0}")]
    Unavailable(String),
}

impl RiskServiceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            RiskServiceError::InvalidCoordinate(_) => {
                "Coordinates are out of range. Latitude must be -90..90, longitude -180..180."
            }
            RiskServiceError::NeedsManualEntry => {
                "Your location could not be determined. Please enter it manually."
            }
            RiskServiceError::LocationUnavailable(_) => {
                "Location services are unavailable. Please try again."
            }
            RiskServiceError::Unavailable(_) => {
                "Fire risk data is unavailable right now. Please try again."
            }
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        // Request URLs carry coordinates in the query string; keep them out of messages
        let e = self.without_url();
        if e.is_timeout() {
            NetworkError::Timeout
        } else if e.is_connect() {
            NetworkError::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            NetworkError::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            NetworkError::ConnectionFailed(e.to_string())
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_storage_error(self) -> StorageError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_storage_error(self) -> StorageError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                StorageError::Corruption(self.to_string())
            }
            _ => StorageError::QueryFailed(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_are_non_empty() {
        let messages = [
            NetworkError::Timeout.user_message(),
            StorageError::QueryFailed("test".into()).user_message(),
            ConfigError::Invalid("test".into()).user_message(),
            RiskServiceError::NeedsManualEntry.user_message(),
            RiskServiceError::Unavailable("all tiers".into()).user_message(),
        ];

        for message in messages {
            assert!(!message.is_empty());
        }
    }

    #[test]
    fn test_app_error_conversion() {
        let err: AppError = RiskServiceError::NeedsManualEntry.into();
        assert!(matches!(
            err,
            AppError::Risk(RiskServiceError::NeedsManualEntry)
        ));
    }

    #[test]
    fn test_user_message_propagation() {
        let err = AppError::Network(NetworkError::ServerError {
            status: 503,
            message: "unavailable".into(),
        });
        assert_eq!(
            err.user_message(),
            "The server is experiencing issues. Please try again later."
        );
    }

    #[test]
    fn test_corrupt_sqlite_maps_to_corruption() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(11),
            Some("database disk image is malformed: corrupt".into()),
        );
        assert!(matches!(
            err.into_storage_error(),
            StorageError::Corruption(_)
        ));
    }
}
