//! Transaction and cursor implementation for the `redb` backend.

use std::ops::Bound;

use redb::{AccessGuard, ReadTransaction, ReadableTable, WriteTransaction};

use crate::engine::{
    CommandHandler, Comparator, Cursor, CursorResult, Direction, KeyValue, PutMode, Seek,
    StorageError, StorageResult, Transaction,
};

use super::engine::RedbEngine;
use super::tables::{commit_error, storage_error, table_error, KEYSPACE};

enum TxState {
    Read(ReadTransaction),
    /// Reset read transaction: snapshot released, awaiting renew.
    Parked,
    Write(WriteTransaction),
}

/// Transaction over a [`RedbEngine`].
pub struct RedbTransaction<'e> {
    engine: &'e RedbEngine,
    state: TxState,
}

impl<'e> RedbTransaction<'e> {
    pub(super) fn new_read(engine: &'e RedbEngine, txn: ReadTransaction) -> Self {
        Self {
            engine,
            state: TxState::Read(txn),
        }
    }

    pub(super) fn new_write(engine: &'e RedbEngine, txn: WriteTransaction) -> Self {
        Self {
            engine,
            state: TxState::Write(txn),
        }
    }

    /// Opens the keyspace table for reading; `Ok(None)` means the table is
    /// missing, which readers treat as an empty keyspace.
    fn keyspace(&self) -> StorageResult<Option<Keyspace<'_>>> {
        match &self.state {
            TxState::Read(txn) => match txn.open_table(KEYSPACE) {
                Ok(table) => Ok(Some(Keyspace::Read(table))),
                Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
                Err(err) => Err(table_error(err)),
            },
            TxState::Write(txn) => txn
                .open_table(KEYSPACE)
                .map(|table| Some(Keyspace::Write(table)))
                .map_err(table_error),
            TxState::Parked => Err(StorageError::InvalidArgument(
                "transaction is reset; renew it first".into(),
            )),
        }
    }

    fn write_row(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        match &self.state {
            TxState::Write(txn) => {
                let mut table = txn.open_table(KEYSPACE).map_err(table_error)?;
                table.insert(key, value).map(drop).map_err(storage_error)
            }
            TxState::Read(_) | TxState::Parked => Err(StorageError::ReadOnly),
        }
    }

    fn remove_row(&self, key: &[u8]) -> StorageResult<bool> {
        match &self.state {
            TxState::Write(txn) => {
                let mut table = txn.open_table(KEYSPACE).map_err(table_error)?;
                let removed = table.remove(key).map_err(storage_error)?;
                Ok(removed.is_some())
            }
            TxState::Read(_) | TxState::Parked => Err(StorageError::ReadOnly),
        }
    }
}

impl Transaction for RedbTransaction<'_> {
    type Cursor<'a>
        = RedbCursor<'a>
    where
        Self: 'a;

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.keyspace()? {
            Some(keyspace) => keyspace.lookup(key),
            None => Ok(None),
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.write_row(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<bool> {
        self.remove_row(key)
    }

    fn cursor(&self) -> StorageResult<Self::Cursor<'_>> {
        if matches!(self.state, TxState::Parked) {
            return Err(StorageError::InvalidArgument(
                "transaction is reset; renew it first".into(),
            ));
        }
        let read_only = !matches!(self.state, TxState::Write(_));
        Ok(RedbCursor::new(
            self,
            self.engine.comparator().clone(),
            read_only,
        ))
    }

    fn commit(self) -> StorageResult<()> {
        match self.state {
            TxState::Write(txn) => txn.commit().map_err(commit_error),
            // committing a read transaction just ends it
            TxState::Read(_) | TxState::Parked => Ok(()),
        }
    }

    fn rollback(self) -> StorageResult<()> {
        match self.state {
            TxState::Write(txn) => {
                drop(txn.abort());
                Ok(())
            }
            TxState::Read(_) | TxState::Parked => Ok(()),
        }
    }

    fn is_read_only(&self) -> bool {
        !matches!(self.state, TxState::Write(_))
    }

    fn reset(&mut self) -> StorageResult<()> {
        match self.state {
            TxState::Read(_) => {
                // dropping the read transaction releases its snapshot
                self.state = TxState::Parked;
                Ok(())
            }
            TxState::Parked => Ok(()),
            TxState::Write(_) => Err(StorageError::InvalidArgument(
                "cannot reset a write transaction".into(),
            )),
        }
    }

    fn renew(&mut self) -> StorageResult<()> {
        match self.state {
            TxState::Parked => {
                self.state = TxState::Read(self.engine.raw_read()?);
                Ok(())
            }
            TxState::Read(_) | TxState::Write(_) => Err(StorageError::InvalidArgument(
                "renew requires a reset transaction".into(),
            )),
        }
    }

    fn comparator(&self) -> &Comparator {
        self.engine.comparator()
    }

    fn command_handler(&self) -> Option<CommandHandler> {
        self.engine.command_handler()
    }
}

/// Read view over the keyspace table of either transaction kind.
enum Keyspace<'t> {
    Read(redb::ReadOnlyTable<&'static [u8], &'static [u8]>),
    Write(redb::Table<'t, &'static [u8], &'static [u8]>),
}

impl Keyspace<'_> {
    fn lookup(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self {
            Self::Read(table) => read_value(table, key),
            Self::Write(table) => read_value(table, key),
        }
    }

    fn seek_row(&self, key: &[u8], seek: Seek) -> StorageResult<Option<KeyValue>> {
        match self {
            Self::Read(table) => seek_entry(table, key, seek),
            Self::Write(table) => seek_entry(table, key, seek),
        }
    }

    fn boundary_row(&self, dir: Direction) -> StorageResult<Option<KeyValue>> {
        match self {
            Self::Read(table) => boundary_entry(table, dir),
            Self::Write(table) => boundary_entry(table, dir),
        }
    }

    fn step_row(&self, key: &[u8], dir: Direction) -> StorageResult<Option<KeyValue>> {
        match self {
            Self::Read(table) => step_entry(table, key, dir),
            Self::Write(table) => step_entry(table, key, dir),
        }
    }
}

fn read_value<T>(table: &T, key: &[u8]) -> StorageResult<Option<Vec<u8>>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let guard = table.get(key).map_err(storage_error)?;
    Ok(guard.map(|value| value.value().to_vec()))
}

fn seek_entry<T>(table: &T, key: &[u8], seek: Seek) -> StorageResult<Option<KeyValue>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    match seek {
        Seek::Exact => Ok(read_value(table, key)?.map(|value| (key.to_vec(), value))),
        Seek::Forward => decode_entry(table.range(key..).map_err(storage_error)?.next()),
        Seek::Reverse => decode_entry(table.range(..=key).map_err(storage_error)?.next_back()),
    }
}

fn boundary_entry<T>(table: &T, dir: Direction) -> StorageResult<Option<KeyValue>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut range = table.iter().map_err(storage_error)?;
    match dir {
        Direction::Forward => decode_entry(range.next()),
        Direction::Reverse => decode_entry(range.next_back()),
    }
}

/// The entry strictly past `key` in `dir`; `key` itself need not exist.
fn step_entry<T>(table: &T, key: &[u8], dir: Direction) -> StorageResult<Option<KeyValue>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    match dir {
        Direction::Forward => decode_entry(
            table
                .range::<&[u8]>((Bound::Excluded(key), Bound::Unbounded))
                .map_err(storage_error)?
                .next(),
        ),
        Direction::Reverse => {
            decode_entry(table.range(..key).map_err(storage_error)?.next_back())
        }
    }
}

type RawEntry<'a> = Result<
    (AccessGuard<'a, &'static [u8]>, AccessGuard<'a, &'static [u8]>),
    redb::StorageError,
>;

fn decode_entry(entry: Option<RawEntry<'_>>) -> StorageResult<Option<KeyValue>> {
    match entry {
        Some(entry) => {
            let (key, value) = entry.map_err(storage_error)?;
            Ok(Some((key.value().to_vec(), value.value().to_vec())))
        }
        None => Ok(None),
    }
}

/// Cursor over a [`RedbTransaction`].
///
/// `redb` has no native cursor, so the position is anchored by key and
/// every step runs a bounded range query against the transaction's view.
/// Key anchoring also keeps the position valid across writes made through
/// the same transaction, including the cursor's own `put` and `del`.
pub struct RedbCursor<'t> {
    txn: &'t RedbTransaction<'t>,
    comparator: Comparator,
    read_only: bool,
    /// Key the position is anchored at. Outlives the entry after a delete
    /// so stepping resumes from the vacated slot.
    anchor: Option<Vec<u8>>,
    entry: Option<KeyValue>,
}

impl<'t> RedbCursor<'t> {
    fn new(txn: &'t RedbTransaction<'t>, comparator: Comparator, read_only: bool) -> Self {
        Self {
            txn,
            comparator,
            read_only,
            anchor: None,
            entry: None,
        }
    }

    fn settle(&mut self, row: Option<KeyValue>) -> CursorResult {
        self.anchor = row.as_ref().map(|(k, _)| k.clone());
        self.entry = row.clone();
        Ok(row)
    }
}

impl Cursor for RedbCursor<'_> {
    fn comparator(&self) -> &Comparator {
        &self.comparator
    }

    fn current(&self) -> Option<(&[u8], &[u8])> {
        self.entry.as_ref().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    fn seek(&mut self, key: &[u8], seek: Seek) -> CursorResult {
        let row = match self.txn.keyspace()? {
            Some(keyspace) => keyspace.seek_row(key, seek)?,
            None => None,
        };
        self.settle(row)
    }

    fn first(&mut self, dir: Direction) -> CursorResult {
        let row = match self.txn.keyspace()? {
            Some(keyspace) => keyspace.boundary_row(dir)?,
            None => None,
        };
        self.settle(row)
    }

    fn next(&mut self, dir: Direction) -> CursorResult {
        let row = match (self.txn.keyspace()?, &self.anchor) {
            (Some(keyspace), Some(anchor)) => keyspace.step_row(anchor, dir)?,
            (Some(keyspace), None) => keyspace.boundary_row(dir)?,
            (None, _) => None,
        };
        self.settle(row)
    }

    fn put(&mut self, key: &[u8], value: &[u8], mode: PutMode) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        if mode == PutMode::NoOverwrite {
            let occupied = match self.txn.keyspace()? {
                Some(keyspace) => keyspace.lookup(key)?.is_some(),
                None => false,
            };
            if occupied {
                return Err(StorageError::KeyExists);
            }
        }
        self.txn.write_row(key, value)?;
        self.anchor = Some(key.to_vec());
        self.entry = Some((key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn del(&mut self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let key = match &self.entry {
            Some((key, _)) => key.clone(),
            None => {
                return Err(StorageError::InvalidArgument(
                    "cursor is not positioned on an entry".into(),
                ))
            }
        };
        self.txn.remove_row(&key)?;
        self.entry = None;
        self.anchor = Some(key);
        Ok(())
    }

    fn clear(&mut self) {
        self.anchor = None;
        self.entry = None;
    }
}
