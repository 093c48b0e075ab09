//! `redb` storage engine.

use std::fmt;
use std::path::Path;

use redb::backends::InMemoryBackend;
use redb::{Database, ReadTransaction};
use tracing::{error, info};

use crate::engine::{
    CommandHandler, Comparator, Durability, EnvConfig, StorageEngine, StorageError, StorageResult,
};

use super::tables::{begin_error, commit_error, open_error, table_error, KEYSPACE};
use super::transaction::RedbTransaction;

/// Storage engine backed by `redb`.
///
/// One ordered keyspace in a single-file B-tree database. Isolation comes
/// from `redb` itself: readers hold an MVCC snapshot and one write
/// transaction runs at a time. Keys are ordered by raw bytes, which is
/// why a configured [`EnvConfig::comparator`] is rejected at open instead
/// of being silently ignored.
pub struct RedbEngine {
    db: Database,
    comparator: Comparator,
    command: Option<CommandHandler>,
    durability: Durability,
}

impl RedbEngine {
    /// Opens (or creates) a database file with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be created or
    /// opened, and [`StorageError::Panic`] if it holds a keyspace this
    /// crate did not write.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(path, EnvConfig::new())
    }

    /// Opens (or creates) a database file from `config`.
    ///
    /// `cache_size` and `durability` are applied. `map_size` and
    /// `txn_size` have no `redb` equivalent (the file grows on demand) and
    /// are accepted as no-ops. A custom `comparator` is rejected with
    /// [`StorageError::NotSupported`] before anything is opened.
    ///
    /// # Errors
    ///
    /// Same as [`RedbEngine::open`], plus the comparator rejection.
    pub fn open_with_config(path: impl AsRef<Path>, config: EnvConfig) -> StorageResult<Self> {
        let builder = Self::builder(&config)?;
        let db = builder.create(path.as_ref()).map_err(open_error)?;
        info!(path = %path.as_ref().display(), "opened redb environment");
        Self::bootstrap(db, config)
    }

    /// Opens a fresh in-memory database, mainly for tests and tools.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the backing store cannot be set
    /// up.
    pub fn in_memory() -> StorageResult<Self> {
        Self::in_memory_with_config(EnvConfig::new())
    }

    /// Opens a fresh in-memory database from `config`.
    ///
    /// # Errors
    ///
    /// Same as [`RedbEngine::in_memory`], plus the comparator rejection.
    pub fn in_memory_with_config(config: EnvConfig) -> StorageResult<Self> {
        let builder = Self::builder(&config)?;
        let db = builder
            .create_with_backend(InMemoryBackend::new())
            .map_err(open_error)?;
        Self::bootstrap(db, config)
    }

    fn builder(config: &EnvConfig) -> StorageResult<redb::Builder> {
        if config.comparator.is_some() {
            return Err(StorageError::NotSupported(
                "redb orders keys by raw bytes; custom comparators are not applied".into(),
            ));
        }
        let mut builder = Database::builder();
        if let Some(bytes) = config.cache_size {
            builder.set_cache_size(bytes);
        }
        Ok(builder)
    }

    /// Creates the keyspace table if missing and verifies its shape.
    fn bootstrap(db: Database, config: EnvConfig) -> StorageResult<Self> {
        let txn = db.begin_write().map_err(begin_error)?;
        if let Err(err) = txn.open_table(KEYSPACE) {
            let err = table_error(err);
            error!(error = %err, "keyspace verification failed");
            return Err(err);
        }
        txn.commit().map_err(commit_error)?;
        Ok(Self {
            db,
            comparator: Comparator::default(),
            command: config.command,
            durability: config.durability,
        })
    }

    pub(super) fn comparator(&self) -> &Comparator {
        &self.comparator
    }

    pub(super) fn command_handler(&self) -> Option<CommandHandler> {
        self.command.clone()
    }

    /// Begins a raw read transaction, shared by `begin_read` and cursorless
    /// renewal.
    pub(super) fn raw_read(&self) -> StorageResult<ReadTransaction> {
        self.db.begin_read().map_err(begin_error)
    }
}

impl fmt::Debug for RedbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbEngine")
            .field("db", &self.db)
            .field("comparator", &self.comparator)
            .field("durability", &self.durability)
            .field("command", &self.command.is_some())
            .finish()
    }
}

impl StorageEngine for RedbEngine {
    type Transaction<'a>
        = RedbTransaction<'a>
    where
        Self: 'a;

    fn begin_read(&self) -> StorageResult<Self::Transaction<'_>> {
        Ok(RedbTransaction::new_read(self, self.raw_read()?))
    }

    fn begin_write(&self) -> StorageResult<Self::Transaction<'_>> {
        let mut txn = self.db.begin_write().map_err(begin_error)?;
        txn.set_durability(durability(self.durability));
        Ok(RedbTransaction::new_write(self, txn))
    }
}

/// Maps configured durability onto `redb`'s commit modes.
fn durability(durability: Durability) -> redb::Durability {
    match durability {
        Durability::Immediate => redb::Durability::Immediate,
        Durability::Eventual => redb::Durability::Eventual,
        Durability::None => redb::Durability::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Transaction;

    #[test]
    fn in_memory_round_trip() {
        let engine = RedbEngine::in_memory().expect("failed to open in-memory engine");
        let mut txn = engine.begin_write().expect("failed to begin write");
        txn.put(b"key", b"value").expect("failed to put");
        txn.commit().expect("failed to commit");

        let txn = engine.begin_read().expect("failed to begin read");
        assert_eq!(txn.get(b"key").expect("failed to get"), Some(b"value".to_vec()));
        assert_eq!(txn.get(b"missing").expect("failed to get"), None);
    }

    #[test]
    fn rejects_custom_comparator() {
        let config = EnvConfig::new().comparator(Comparator::new(|a, b| b.cmp(a)));
        let err = RedbEngine::in_memory_with_config(config).unwrap_err();
        assert!(matches!(err, StorageError::NotSupported(_)));
    }

    #[test]
    fn durability_config_is_accepted() {
        let config = EnvConfig::new().durability(Durability::None);
        let engine =
            RedbEngine::in_memory_with_config(config).expect("failed to open in-memory engine");
        let mut txn = engine.begin_write().expect("failed to begin write");
        txn.put(b"k", b"v").expect("failed to put");
        txn.commit().expect("failed to commit");
    }
}
