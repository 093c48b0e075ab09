//! In-memory storage backend.
//!
//! [`MemEngine`] keeps the keyspace in a comparator-ordered entry vector
//! behind a read-write lock. Read transactions clone the current entries;
//! write transactions stage a copy and swap it in on commit, so readers see
//! a stable snapshot and writers race optimistically (last commit wins).
//!
//! This is the custom-comparator exemplar: unlike `redb`, the entry order
//! here is a runtime value, so [`crate::EnvConfig::comparator`] is honored.
//! The crate-internal [`MemTable`] and [`MemCursor`] double as the overlay
//! layer's temp store, so buffered transactions exercise exactly the cursor
//! code this backend exposes publicly.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use crate::engine::{
    CommandHandler, Comparator, Cursor, CursorResult, Direction, EnvConfig, KeyValue, PutMode,
    Seek, StorageEngine, StorageError, StorageResult, Transaction,
};

/// Comparator-ordered entry set.
///
/// A sorted vector rather than a `BTreeMap` because the order is a runtime
/// comparator, not the key type's `Ord`.
#[derive(Clone)]
pub(crate) struct MemTable {
    rows: Vec<KeyValue>,
    cmp: Comparator,
}

impl MemTable {
    pub(crate) fn new(cmp: Comparator) -> Self {
        Self {
            rows: Vec::new(),
            cmp,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first row at or after `key`.
    fn lower_bound(&self, key: &[u8]) -> usize {
        self.rows
            .partition_point(|(k, _)| self.cmp.compare(k, key) == Ordering::Less)
    }

    fn row_matches(&self, idx: usize, key: &[u8]) -> bool {
        matches!(self.rows.get(idx), Some((k, _)) if self.cmp.compare(k, key) == Ordering::Equal)
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let idx = self.lower_bound(key);
        if self.row_matches(idx, key) {
            Some(&self.rows[idx].1)
        } else {
            None
        }
    }

    pub(crate) fn insert(&mut self, key: &[u8], value: &[u8]) {
        let idx = self.lower_bound(key);
        if self.row_matches(idx, key) {
            self.rows[idx].1 = value.to_vec();
        } else {
            self.rows.insert(idx, (key.to_vec(), value.to_vec()));
        }
    }

    pub(crate) fn remove(&mut self, key: &[u8]) -> bool {
        let idx = self.lower_bound(key);
        let exact = self.row_matches(idx, key);
        if exact {
            self.rows.remove(idx);
        }
        exact
    }

    /// The row `seek` resolves `key` to, if any.
    pub(crate) fn seek_row(&self, key: &[u8], seek: Seek) -> Option<KeyValue> {
        let idx = self.lower_bound(key);
        match seek {
            Seek::Exact => self.row_matches(idx, key).then(|| self.rows[idx].clone()),
            Seek::Forward => self.rows.get(idx).cloned(),
            Seek::Reverse => {
                if self.row_matches(idx, key) {
                    Some(self.rows[idx].clone())
                } else if idx > 0 {
                    // nearest predecessor; also the overall largest row when
                    // nothing is at or after `key`
                    Some(self.rows[idx - 1].clone())
                } else {
                    None
                }
            }
        }
    }

    /// The boundary row in `dir`.
    pub(crate) fn boundary_row(&self, dir: Direction) -> Option<KeyValue> {
        match dir {
            Direction::Forward => self.rows.first().cloned(),
            Direction::Reverse => self.rows.last().cloned(),
        }
    }

    /// The first row strictly past `key` in `dir`. `key` itself need not
    /// exist.
    pub(crate) fn step_row(&self, key: &[u8], dir: Direction) -> Option<KeyValue> {
        let idx = self.lower_bound(key);
        match dir {
            Direction::Forward => {
                let idx = if self.row_matches(idx, key) { idx + 1 } else { idx };
                self.rows.get(idx).cloned()
            }
            Direction::Reverse => (idx > 0).then(|| self.rows[idx - 1].clone()),
        }
    }

    /// Consumes the table into its rows, in key order.
    pub(crate) fn into_rows(self) -> Vec<KeyValue> {
        self.rows
    }
}

/// In-memory storage engine with snapshot isolation.
pub struct MemEngine {
    data: Arc<RwLock<MemTable>>,
    comparator: Comparator,
    command: Option<CommandHandler>,
}

impl MemEngine {
    /// Creates an empty engine with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EnvConfig::new())
    }

    /// Creates an empty engine from `config`.
    ///
    /// `comparator` and `command` are honored; `map_size`, `cache_size`,
    /// `txn_size`, and `durability` have no meaning in memory and are
    /// accepted as no-ops.
    #[must_use]
    pub fn with_config(config: EnvConfig) -> Self {
        let comparator = config.comparator.unwrap_or_default();
        Self {
            data: Arc::new(RwLock::new(MemTable::new(comparator.clone()))),
            comparator,
            command: config.command,
        }
    }

    fn snapshot(&self) -> StorageResult<MemTable> {
        self.data
            .read()
            .map(|table| table.clone())
            .map_err(|_| StorageError::Panic("mem engine lock poisoned".into()))
    }
}

impl Default for MemEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemEngine {
    type Transaction<'a>
        = MemTransaction
    where
        Self: 'a;

    fn begin_read(&self) -> StorageResult<Self::Transaction<'_>> {
        Ok(MemTransaction {
            source: Arc::clone(&self.data),
            state: MemTxState::Read(RefCell::new(self.snapshot()?)),
            comparator: self.comparator.clone(),
            command: self.command.clone(),
        })
    }

    fn begin_write(&self) -> StorageResult<Self::Transaction<'_>> {
        Ok(MemTransaction {
            source: Arc::clone(&self.data),
            state: MemTxState::Write(RefCell::new(self.snapshot()?)),
            comparator: self.comparator.clone(),
            command: self.command.clone(),
        })
    }
}

enum MemTxState {
    Read(RefCell<MemTable>),
    /// Reset read transaction: snapshot released, awaiting renew.
    Parked,
    Write(RefCell<MemTable>),
}

/// Transaction over a [`MemEngine`] snapshot.
pub struct MemTransaction {
    source: Arc<RwLock<MemTable>>,
    state: MemTxState,
    comparator: Comparator,
    command: Option<CommandHandler>,
}

impl MemTransaction {
    fn table(&self) -> StorageResult<&RefCell<MemTable>> {
        match &self.state {
            MemTxState::Read(table) | MemTxState::Write(table) => Ok(table),
            MemTxState::Parked => Err(StorageError::InvalidArgument(
                "transaction is reset; renew it first".into(),
            )),
        }
    }

    fn writable(&self) -> StorageResult<&RefCell<MemTable>> {
        match &self.state {
            MemTxState::Write(table) => Ok(table),
            MemTxState::Read(_) | MemTxState::Parked => Err(StorageError::ReadOnly),
        }
    }
}

impl Transaction for MemTransaction {
    type Cursor<'a>
        = MemCursor<'a>
    where
        Self: 'a;

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.table()?.borrow().get(key).map(|v| v.to_vec()))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.writable()?.borrow_mut().insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.writable()?.borrow_mut().remove(key))
    }

    fn cursor(&self) -> StorageResult<Self::Cursor<'_>> {
        let writable = matches!(self.state, MemTxState::Write(_));
        Ok(MemCursor::new(
            self.table()?,
            self.comparator.clone(),
            !writable,
        ))
    }

    fn commit(self) -> StorageResult<()> {
        let MemTransaction { source, state, .. } = self;
        match state {
            MemTxState::Write(staged) => {
                let mut data = source
                    .write()
                    .map_err(|_| StorageError::Panic("mem engine lock poisoned".into()))?;
                *data = staged.into_inner();
                Ok(())
            }
            // committing a read transaction just ends it
            MemTxState::Read(_) | MemTxState::Parked => Ok(()),
        }
    }

    fn rollback(self) -> StorageResult<()> {
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        !matches!(self.state, MemTxState::Write(_))
    }

    fn reset(&mut self) -> StorageResult<()> {
        match self.state {
            MemTxState::Read(_) => {
                self.state = MemTxState::Parked;
                Ok(())
            }
            MemTxState::Parked => Ok(()),
            MemTxState::Write(_) => Err(StorageError::InvalidArgument(
                "cannot reset a write transaction".into(),
            )),
        }
    }

    fn renew(&mut self) -> StorageResult<()> {
        match self.state {
            MemTxState::Parked => {
                let snapshot = self
                    .source
                    .read()
                    .map(|table| table.clone())
                    .map_err(|_| StorageError::Panic("mem engine lock poisoned".into()))?;
                self.state = MemTxState::Read(RefCell::new(snapshot));
                Ok(())
            }
            MemTxState::Read(_) | MemTxState::Write(_) => Err(StorageError::InvalidArgument(
                "renew requires a reset transaction".into(),
            )),
        }
    }

    fn comparator(&self) -> &Comparator {
        &self.comparator
    }

    fn command_handler(&self) -> Option<CommandHandler> {
        self.command.clone()
    }
}

/// Cursor over a [`MemTransaction`].
///
/// Position is anchored by key, not index, so the cursor stays valid across
/// writes made through the same transaction (including its own `put`/`del`).
pub struct MemCursor<'a> {
    table: &'a RefCell<MemTable>,
    comparator: Comparator,
    read_only: bool,
    /// Key the position is anchored at. Outlives the entry after a delete
    /// so stepping resumes from the vacated slot.
    anchor: Option<Vec<u8>>,
    entry: Option<KeyValue>,
}

impl<'a> MemCursor<'a> {
    pub(crate) fn new(table: &'a RefCell<MemTable>, comparator: Comparator, read_only: bool) -> Self {
        Self {
            table,
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

impl Cursor for MemCursor<'_> {
    fn comparator(&self) -> &Comparator {
        &self.comparator
    }

    fn current(&self) -> Option<(&[u8], &[u8])> {
        self.entry.as_ref().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    fn seek(&mut self, key: &[u8], seek: Seek) -> CursorResult {
        let row = self.table.borrow().seek_row(key, seek);
        self.settle(row)
    }

    fn first(&mut self, dir: Direction) -> CursorResult {
        let row = self.table.borrow().boundary_row(dir);
        self.settle(row)
    }

    fn next(&mut self, dir: Direction) -> CursorResult {
        let row = match &self.anchor {
            Some(anchor) => self.table.borrow().step_row(anchor, dir),
            None => self.table.borrow().boundary_row(dir),
        };
        self.settle(row)
    }

    fn put(&mut self, key: &[u8], value: &[u8], mode: PutMode) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        {
            let mut table = self.table.borrow_mut();
            if mode == PutMode::NoOverwrite && table.get(key).is_some() {
                return Err(StorageError::KeyExists);
            }
            table.insert(key, value);
        }
        self.anchor = Some(key.to_vec());
        self.entry = Some((key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn del(&mut self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let Some((key, _)) = self.entry.take() else {
            return Err(StorageError::InvalidArgument(
                "cursor is not positioned on an entry".into(),
            ));
        };
        self.table.borrow_mut().remove(&key);
        self.anchor = Some(key);
        Ok(())
    }

    fn clear(&mut self) {
        self.anchor = None;
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let engine = MemEngine::new();
        let mut tx = engine.begin_write().unwrap();
        tx.put(b"key1", b"value1").unwrap();
        assert_eq!(tx.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        tx.commit().unwrap();

        let tx = engine.begin_read().unwrap();
        assert_eq!(tx.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(tx.get(b"missing").unwrap(), None);
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let engine = MemEngine::new();
        let mut tx = engine.begin_write().unwrap();
        tx.put(b"a", b"1").unwrap();
        tx.commit().unwrap();

        let reader = engine.begin_read().unwrap();
        let mut writer = engine.begin_write().unwrap();
        writer.put(b"a", b"2").unwrap();
        writer.commit().unwrap();

        assert_eq!(reader.get(b"a").unwrap(), Some(b"1".to_vec()));
        let fresh = engine.begin_read().unwrap();
        assert_eq!(fresh.get(b"a").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn custom_comparator_reverses_scan_order() {
        let config = EnvConfig::new().comparator(Comparator::new(|a, b| b.cmp(a)));
        let engine = MemEngine::with_config(config);
        let mut tx = engine.begin_write().unwrap();
        tx.put(b"a", b"1").unwrap();
        tx.put(b"b", b"2").unwrap();
        tx.put(b"c", b"3").unwrap();

        let mut cursor = tx.cursor().unwrap();
        let (first, _) = cursor.first(Direction::Forward).unwrap().unwrap();
        assert_eq!(first, b"c".to_vec());
        let (second, _) = cursor.next(Direction::Forward).unwrap().unwrap();
        assert_eq!(second, b"b".to_vec());
    }

    #[test]
    fn reset_renew_cycle() {
        let engine = MemEngine::new();
        let mut writer = engine.begin_write().unwrap();
        writer.put(b"k", b"old").unwrap();
        writer.commit().unwrap();

        let mut reader = engine.begin_read().unwrap();
        reader.reset().unwrap();
        reader.reset().unwrap();
        assert!(reader.get(b"k").is_err());

        let mut writer = engine.begin_write().unwrap();
        writer.put(b"k", b"new").unwrap();
        writer.commit().unwrap();

        reader.renew().unwrap();
        assert_eq!(reader.get(b"k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn cursor_delete_resumes_from_vacated_slot() {
        let engine = MemEngine::new();
        let mut tx = engine.begin_write().unwrap();
        for key in [b"a", b"b", b"c"] {
            tx.put(key, b"v").unwrap();
        }
        let mut cursor = tx.cursor().unwrap();
        cursor.seek(b"b", Seek::Exact).unwrap().unwrap();
        cursor.del().unwrap();
        assert!(cursor.current().is_none());
        let (next, _) = cursor.next(Direction::Forward).unwrap().unwrap();
        assert_eq!(next, b"c".to_vec());
        let (prev, _) = cursor.next(Direction::Reverse).unwrap().unwrap();
        assert_eq!(prev, b"a".to_vec());
        assert_eq!(tx.get(b"b").unwrap(), None);
    }

    #[test]
    fn zero_length_keys_and_values() {
        let engine = MemEngine::new();
        let mut tx = engine.begin_write().unwrap();
        tx.put(b"", b"empty-key").unwrap();
        tx.put(b"k", b"").unwrap();
        assert_eq!(tx.get(b"").unwrap(), Some(b"empty-key".to_vec()));
        assert_eq!(tx.get(b"k").unwrap(), Some(Vec::new()));
    }
}
