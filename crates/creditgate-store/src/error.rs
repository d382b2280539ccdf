//! Error types for the store module.

use creditgate_core::{CoreError, IdentityDigest, RequestId};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Identity already provisioned.
    #[error("identity already exists: {0}")]
    AlreadyExists(IdentityDigest),

    /// Identity not found.
    #[error("identity not found: {0}")]
    NotFound(IdentityDigest),

    /// A ledger entry with this request id already exists.
    #[error("duplicate request id: {0}")]
    DuplicateRequest(RequestId),

    /// A settlement asked for something the store's invariants forbid.
    #[error("invalid settlement: {0}")]
    InvalidSettlement(String),

    /// Arithmetic would overflow the representable credit range.
    #[error("credit overflow: {0}")]
    Overflow(String),

    /// Entry encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] CoreError),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The backend cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A lock guarding store state was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

impl StoreError {
    /// True if SQLite gave up waiting for a lock held by another writer.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
