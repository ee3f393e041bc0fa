//! Storage error types.

use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version mismatch: found v{found}, expected v{expected}")]
    SchemaVersionMismatch { found: u32, expected: u32 },

    #[error("schema not initialized: call ensure_schema first")]
    SchemaNotReady,

    #[error("data corruption: {0}")]
    Corruption(String),
}
