//! Storage errors

use buzon_model::CaseId;
use thiserror::Error;

/// Errors raised by any storage backend
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Error from `SQLite`
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error from the blob store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob metadata could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Conditional append lost against a concurrent append
    #[error("ledger head of case {case_id} moved: expected {expected:?}, found {actual:?}")]
    HeadMoved {
        case_id: CaseId,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    /// Folio already issued
    #[error("folio already exists: {0}")]
    DuplicateFolio(String),

    /// Case row is missing
    #[error("case not found: {0}")]
    CaseNotFound(CaseId),

    /// Operation not offered by this backend
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    /// Stored row could not be decoded
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Backend temporarily unavailable
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Busy, locked or unavailable conditions that may clear on retry
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            StoreError::Unavailable(_) => true,
            _ => false,
        }
    }
}

/// Result alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
