//! Error types for the storage layer.

use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by storage engines and the overlay layer.
///
/// Lookup misses are not errors: point reads return `Ok(None)`, deletes
/// report `Ok(false)`, and scans terminate with `Ok(None)`.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The environment could not be opened.
    #[error("failed to open environment: {0}")]
    Open(String),

    /// Caller misuse: the operation is not valid in the current state.
    ///
    /// Covers operating on a reset transaction, deleting at an unpositioned
    /// cursor, forwarding a command with no handler configured, and
    /// recycling a write transaction.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A write was attempted through a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// A no-overwrite put found the key already visible.
    #[error("key already exists")]
    KeyExists,

    /// The active backend cannot honor the requested option.
    ///
    /// Returned upfront; the option is never partially applied.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A structural invariant of the backing store was violated.
    ///
    /// Unrecoverable: the environment that produced this must be discarded.
    #[error("storage invariant violated: {0}")]
    Panic(String),

    /// The backend failed to begin or commit a transaction.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Any other backend-native failure.
    #[error("internal storage error: {0}")]
    Internal(String),

    /// An I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether retrying with different arguments can succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::KeyExists)
    }

    /// Whether the environment that produced this error must be discarded.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panic(_))
    }
}
