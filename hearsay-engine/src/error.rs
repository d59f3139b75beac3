//! Error types for the hearsay engine
//!
//! Three families of failures cross the engine boundary: configuration
//! errors (a question's sample set does not fit its species), validation
//! errors (a submitted response is rejected, the caller may retry), and
//! lookup errors (unknown survey/subject/feed).

use thiserror::Error;

/// Main error type for the hearsay engine
#[derive(Error, Debug)]
pub enum Error {
    /// Survey or question configuration does not fit its species
    #[error("Configuration error: {0}")]
    Config(String),

    /// Submitted label/position/level is not one of the presented options
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// Submitted rating is outside the allowed range
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// A declarative per-question validator rejected the response
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Requested survey, subject, page or feed does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization of stored validators or parameters failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
