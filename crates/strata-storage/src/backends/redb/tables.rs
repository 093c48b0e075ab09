//! Keyspace table definition and `redb` error translation.

use redb::TableDefinition;

use crate::engine::StorageError;

/// The single physical table holding the environment's keyspace.
///
/// Opening it doubles as an identity check: a database file whose table
/// under this name has a different shape was not written by this crate,
/// and the open fails before any data is touched.
pub(super) const KEYSPACE: TableDefinition<'static, &[u8], &[u8]> =
    TableDefinition::new("strata_keyspace");

/// Translates environment-open failures.
pub(super) fn open_error(err: redb::DatabaseError) -> StorageError {
    StorageError::Open(err.to_string())
}

/// Translates transaction-begin failures.
pub(super) fn begin_error(err: redb::TransactionError) -> StorageError {
    StorageError::Transaction(err.to_string())
}

/// Translates commit failures.
pub(super) fn commit_error(err: redb::CommitError) -> StorageError {
    StorageError::Transaction(err.to_string())
}

/// Translates table-open failures.
///
/// A shape mismatch on the keyspace table means the file belongs to
/// something else entirely, which is unrecoverable.
pub(super) fn table_error(err: redb::TableError) -> StorageError {
    match err {
        redb::TableError::TableTypeMismatch { .. } | redb::TableError::TableIsMultimap(_) => {
            StorageError::Panic(format!("keyspace table mismatch: {err}"))
        }
        redb::TableError::Storage(err) => storage_error(err),
        other => StorageError::Internal(other.to_string()),
    }
}

/// Translates native storage failures.
pub(super) fn storage_error(err: redb::StorageError) -> StorageError {
    match err {
        redb::StorageError::Io(err) => StorageError::Io(err),
        redb::StorageError::Corrupted(message) => StorageError::Panic(message),
        other => StorageError::Internal(other.to_string()),
    }
}
