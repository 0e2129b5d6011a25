//! Error types used throughout the application

use thiserror::Error;

/// Main error type for Atlas
#[derive(Error, Debug)]
pub enum AtlasError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Atlas operations
pub type Result<T> = std::result::Result<T, AtlasError>;
