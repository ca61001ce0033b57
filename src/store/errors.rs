//! # Store Errors
//!
//! Key conflicts and missing keys are not errors: `create`/`update`/`remove`
//! report them as `false` or a zero count.

use thiserror::Error;

use crate::query::QueryError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Document store errors
#[derive(Debug, Error)]
pub enum StoreError {
    // ==================
    // Caller Errors
    // ==================
    /// Predicate could not be compiled; raised before any round trip
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Partition or id outside 1-255 characters
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid store configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ==================
    // Backend Errors
    // ==================
    /// Backing store failure, propagated unchanged
    #[error("Backend error: {0}")]
    Backend(#[from] sqlx::Error),

    /// In-memory backend lock was poisoned
    #[error("Backend state poisoned: {0}")]
    Poisoned(String),

    /// Blocking runtime could not be started
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl StoreError {
    pub fn config(message: impl Into<String>) -> Self {
        StoreError::Config(message.into())
    }

    /// Stable code used by the CLI error envelope
    pub fn code_str(&self) -> &'static str {
        match self {
            StoreError::Query(e) => e.code_str(),
            StoreError::InvalidKey(_) => "PGKV_STORE_INVALID_KEY",
            StoreError::Config(_) => "PGKV_STORE_CONFIG",
            StoreError::Serialization(_) => "PGKV_STORE_SERIALIZATION",
            StoreError::Backend(_) => "PGKV_STORE_BACKEND",
            StoreError::Poisoned(_) => "PGKV_STORE_POISONED",
            StoreError::Runtime(_) => "PGKV_STORE_RUNTIME",
        }
    }

    /// True for errors raised before the backing store was contacted
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StoreError::Query(_) | StoreError::InvalidKey(_) | StoreError::Config(_)
        )
    }
}
