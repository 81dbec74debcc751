//! Error taxonomy for the memory subsystem.

use thiserror::Error;

/// Errors surfaced by the ledger, the vector index, and the recall facade.
///
/// Storage-class errors are non-retriable without operator intervention.
/// `DimensionMismatch` rejects the single offending write or query and never
/// aborts the session. Absence of rows is not an error anywhere in this crate.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("session id must not be empty")]
    EmptySessionId,

    #[error("vector index backend '{0}' is not compiled into this build")]
    IndexUnavailable(&'static str),

    #[error("vector index build failed: {0}")]
    Index(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
