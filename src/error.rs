//! # Error Types
//!
//! Custom error types for Sensor Uplink using `thiserror`.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Sensor Uplink
#[derive(Debug, Error)]
pub enum UplinkError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors (buffer file, marker file, config file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial device errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// Buffer document (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Device line was not valid UTF-8
    #[error("Malformed frame: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Connectivity probe could not be set up
    #[error("Connectivity check error: {0}")]
    Connectivity(String),

    /// Remote store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for Sensor Uplink
pub type Result<T> = std::result::Result<T, UplinkError>;
