//! Error types for the tenant limiter.

use thiserror::Error;

/// Main error type for tenant limiter operations.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed tenant or rule definitions
    #[error("Validation error: {0}")]
    Validation(String),

    /// The rule store or counter store could not be reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A target pattern could not be compiled
    #[error("Pattern error: {0}")]
    Pattern(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LimiterError {
    /// Whether this error came from an unreachable backing store.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, LimiterError::StoreUnavailable(_))
    }
}

impl From<deadpool_redis::redis::RedisError> for LimiterError {
    fn from(err: deadpool_redis::redis::RedisError) -> Self {
        LimiterError::StoreUnavailable(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for LimiterError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        LimiterError::StoreUnavailable(format!("connection pool: {}", err))
    }
}

/// Result type alias for tenant limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
