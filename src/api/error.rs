//! API Error Types
//!
//! Errors raised while starting or running the relay server.

use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Threshold source could not be set up
    #[error("Threshold error: {0}")]
    Thresholds(#[from] crate::thresholds::ThresholdError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
