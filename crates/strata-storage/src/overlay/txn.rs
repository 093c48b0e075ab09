//! Buffered child transactions.

use std::cell::RefCell;

use tracing::debug;

use crate::backends::mem::{MemCursor, MemTable};
use crate::engine::{CommandHandler, Comparator, StorageError, StorageResult, Transaction};

use super::cursor::OverlayCursor;
use super::tag::{encode_put, encode_tombstone, TempValue};

/// A nested transaction that buffers writes over any parent
/// [`Transaction`].
///
/// Obtained through [`Transaction::begin_child`]. The child stages every
/// put and delete in a private comparator-ordered temp store; the parent
/// is left completely untouched until [`commit`](Transaction::commit)
/// replays the buffer into it in key order. Dropping or rolling back the
/// child discards the buffer.
///
/// Reads merge the buffer over the parent's view: a staged put shadows the
/// parent's value, a staged tombstone hides it. Cursors do the same merge
/// incrementally through [`OverlayCursor`].
///
/// The child mutably borrows its parent, so the borrow checker enforces
/// the nesting discipline: one child at a time, and the parent is
/// inaccessible until the child is gone. Children inherit the parent's
/// comparator, command handler, and read-only-ness, and they nest to any
/// depth.
pub struct BufferedTransaction<'p, P> {
    parent: &'p mut P,
    temp: RefCell<MemTable>,
    read_only: bool,
}

impl<'p, P: Transaction> BufferedTransaction<'p, P> {
    pub(crate) fn begin(parent: &'p mut P) -> StorageResult<Self> {
        let comparator = parent.comparator().clone();
        let read_only = parent.is_read_only();
        Ok(Self {
            parent,
            temp: RefCell::new(MemTable::new(comparator)),
            read_only,
        })
    }

    /// Number of buffered entries, tombstones included.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.temp.borrow().len()
    }

    /// The buffer's verdict on `key`: `Some(Some(_))` a staged put,
    /// `Some(None)` a staged delete, `None` nothing staged.
    fn buffered(&self, key: &[u8]) -> StorageResult<Option<Option<Vec<u8>>>> {
        let table = self.temp.borrow();
        match table.get(key) {
            Some(raw) => match TempValue::decode(raw)? {
                TempValue::Put(value) => Ok(Some(Some(value.to_vec()))),
                TempValue::Tombstone => Ok(Some(None)),
            },
            None => Ok(None),
        }
    }
}

impl<'p, P: Transaction> Transaction for BufferedTransaction<'p, P> {
    type Cursor<'a>
        = OverlayCursor<MemCursor<'a>, P::Cursor<'a>>
    where
        Self: 'a;

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.buffered(key)? {
            Some(verdict) => Ok(verdict),
            None => self.parent.get(key),
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        self.temp.borrow_mut().insert(key, &encode_put(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<bool> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let visible = self.get(key)?.is_some();
        if visible {
            self.temp.borrow_mut().insert(key, &encode_tombstone());
        }
        Ok(visible)
    }

    fn cursor(&self) -> StorageResult<Self::Cursor<'_>> {
        let temp = MemCursor::new(
            &self.temp,
            self.parent.comparator().clone(),
            self.read_only,
        );
        let main = self.parent.cursor()?;
        Ok(OverlayCursor::new(temp, main))
    }

    fn commit(self) -> StorageResult<()> {
        let Self { parent, temp, .. } = self;
        let rows = temp.into_inner().into_rows();
        debug!(entries = rows.len(), "replaying buffered writes into parent");
        for (key, raw) in &rows {
            match TempValue::decode(raw)? {
                TempValue::Put(value) => parent.put(key, value)?,
                TempValue::Tombstone => {
                    parent.delete(key)?;
                }
            }
        }
        Ok(())
    }

    fn rollback(self) -> StorageResult<()> {
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn reset(&mut self) -> StorageResult<()> {
        Err(StorageError::InvalidArgument(
            "buffered transactions cannot be reset".into(),
        ))
    }

    fn renew(&mut self) -> StorageResult<()> {
        Err(StorageError::InvalidArgument(
            "buffered transactions cannot be renewed".into(),
        ))
    }

    fn comparator(&self) -> &Comparator {
        self.parent.comparator()
    }

    fn command_handler(&self) -> Option<CommandHandler> {
        self.parent.command_handler()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mem::MemEngine;
    use crate::engine::StorageEngine;

    #[test]
    fn child_buffers_writes_until_commit() {
        let engine = MemEngine::new();
        let mut txn = engine.begin_write().unwrap();
        txn.put(b"a", b"1").unwrap();

        let mut child = txn.begin_child().unwrap();
        child.put(b"b", b"2").unwrap();
        assert_eq!(child.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(child.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(child.pending(), 1);
        child.commit().unwrap();

        assert_eq!(txn.get(b"b").unwrap(), Some(b"2".to_vec()));
        txn.commit().unwrap();
        let txn = engine.begin_read().unwrap();
        assert_eq!(txn.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn rollback_discards_the_buffer() {
        let engine = MemEngine::new();
        let mut txn = engine.begin_write().unwrap();
        txn.put(b"k", b"keep").unwrap();

        let mut child = txn.begin_child().unwrap();
        child.put(b"k", b"lost").unwrap();
        child.put(b"x", b"lost").unwrap();
        child.rollback().unwrap();

        assert_eq!(txn.get(b"k").unwrap(), Some(b"keep".to_vec()));
        assert_eq!(txn.get(b"x").unwrap(), None);
    }

    #[test]
    fn delete_reports_merged_visibility() {
        let engine = MemEngine::new();
        let mut txn = engine.begin_write().unwrap();
        txn.put(b"k", b"v").unwrap();

        let mut child = txn.begin_child().unwrap();
        assert!(child.delete(b"k").unwrap());
        assert_eq!(child.get(b"k").unwrap(), None);
        // already hidden, so a second delete misses
        assert!(!child.delete(b"k").unwrap());
        assert!(!child.delete(b"absent").unwrap());
        child.commit().unwrap();

        assert_eq!(txn.get(b"k").unwrap(), None);
    }

    #[test]
    fn read_only_children_reject_writes() {
        let engine = MemEngine::new();
        let mut writer = engine.begin_write().unwrap();
        writer.put(b"k", b"v").unwrap();
        writer.commit().unwrap();

        let mut reader = engine.begin_read().unwrap();
        let mut child = reader.begin_child().unwrap();
        assert!(child.is_read_only());
        assert!(matches!(
            child.put(b"k", b"w").unwrap_err(),
            StorageError::ReadOnly
        ));
        assert!(matches!(
            child.delete(b"k").unwrap_err(),
            StorageError::ReadOnly
        ));
        assert_eq!(child.get(b"k").unwrap(), Some(b"v".to_vec()));
        // committing an empty buffer is a no-op
        child.commit().unwrap();
    }

    #[test]
    fn children_nest_and_replay_outward() {
        let engine = MemEngine::new();
        let mut txn = engine.begin_write().unwrap();
        txn.put(b"base", b"0").unwrap();

        let mut child = txn.begin_child().unwrap();
        child.put(b"mid", b"1").unwrap();
        {
            let mut grandchild = child.begin_child().unwrap();
            grandchild.put(b"leaf", b"2").unwrap();
            assert_eq!(grandchild.get(b"base").unwrap(), Some(b"0".to_vec()));
            assert_eq!(grandchild.get(b"mid").unwrap(), Some(b"1".to_vec()));
            grandchild.commit().unwrap();
        }
        assert_eq!(child.get(b"leaf").unwrap(), Some(b"2".to_vec()));
        child.commit().unwrap();

        assert_eq!(txn.get(b"mid").unwrap(), Some(b"1".to_vec()));
        assert_eq!(txn.get(b"leaf").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn reset_and_renew_are_rejected() {
        let engine = MemEngine::new();
        let mut reader = engine.begin_read().unwrap();
        let mut child = reader.begin_child().unwrap();
        assert!(child.reset().is_err());
        assert!(child.renew().is_err());
    }
}
