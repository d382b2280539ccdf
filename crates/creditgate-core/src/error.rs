//! Error types for creditgate core.

use thiserror::Error;

/// Errors raised while constructing or encoding core values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identity digest: {0}")]
    InvalidDigest(String),

    #[error("invalid request id: {0}")]
    InvalidRequestId(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("cost must be a positive number of credits")]
    InvalidCost,

    #[error("metadata must be a JSON object or null")]
    InvalidMetadata,

    #[error("encoding error: {0}")]
    EncodingError(String),
}
