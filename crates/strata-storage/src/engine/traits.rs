//! Capability traits shared by every storage backend.
//!
//! Three traits form the contract: [`StorageEngine`] opens transactions,
//! [`Transaction`] scopes reads and writes, and [`Cursor`] walks the ordered
//! keyspace. Concrete backends (`redb`, `mem`) and the overlay layer all
//! implement the same three, so traversal and transaction code is written
//! once against the traits and runs unchanged over any of them, including
//! over a buffered child transaction, where the cursor handed out is a merge
//! of the child's pending writes and the parent's view.
//!
//! Every positioning operation is direction-aware. Callers pass a
//! [`Direction`] (or a [`Seek`] policy) instead of choosing between
//! forward-only and reverse-only method pairs, which keeps scan code
//! direction-agnostic.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use super::error::{StorageError, StorageResult};
use crate::overlay::BufferedTransaction;

/// A key-value pair returned by cursor positioning operations.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Result of a cursor positioning operation.
///
/// `Ok(None)` means the scan ran out of entries in the requested direction;
/// running out is never an error.
pub type CursorResult = Result<Option<KeyValue>, StorageError>;

/// Traversal direction for cursor scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ascending key order.
    Forward,
    /// Descending key order.
    Reverse,
}

impl Direction {
    /// Orients a comparison so that `Less` always means "nearer along this
    /// direction".
    ///
    /// Merging and range checks compare keys through this, which is what
    /// lets one code path serve both scan directions.
    #[must_use]
    pub const fn orient(self, ord: Ordering) -> Ordering {
        match self {
            Self::Forward => ord,
            Self::Reverse => ord.reverse(),
        }
    }

    /// The opposite direction.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }
}

/// Matching policy for [`Cursor::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seek {
    /// Only the target key itself; a miss unpositions the cursor.
    Exact,
    /// The smallest key at or after the target.
    Forward,
    /// The largest key at or before the target.
    Reverse,
}

impl From<Direction> for Seek {
    fn from(dir: Direction) -> Self {
        match dir {
            Direction::Forward => Self::Forward,
            Direction::Reverse => Self::Reverse,
        }
    }
}

/// Overwrite policy for [`Cursor::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutMode {
    /// Insert or replace unconditionally.
    #[default]
    Overwrite,
    /// Fail with [`StorageError::KeyExists`] if the key is already visible.
    NoOverwrite,
}

/// Total order over keys, shared by every cursor in an environment.
///
/// Cloning is cheap; all clones share one underlying function. The default
/// comparator is lexicographic byte order, which is also the only order the
/// `redb` backend can provide. The comparator is fixed for the lifetime of
/// an environment: changing it once data exists corrupts the keyspace.
#[derive(Clone)]
pub struct Comparator(Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>);

impl Comparator {
    /// Wraps a custom ordering function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Compares two keys.
    #[must_use]
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        (self.0)(a, b)
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(|a, b| a.cmp(b))
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Comparator(..)")
    }
}

/// Key interval for range-bounded traversal.
///
/// Bounds follow [`std::ops::Bound`]; [`KeyRange::span`] builds the common
/// half-open `[start, end)` form.
#[derive(Debug, Clone)]
pub struct KeyRange {
    /// Lower end of the range.
    pub start: Bound<Vec<u8>>,
    /// Upper end of the range.
    pub end: Bound<Vec<u8>>,
}

impl KeyRange {
    /// The unbounded range covering the whole keyspace.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// The half-open range `[start, end)`.
    #[must_use]
    pub fn span(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Bound::Excluded(end.into()),
        }
    }

    /// Whether `key` falls inside the range under `cmp`.
    #[must_use]
    pub fn contains(&self, cmp: &Comparator, key: &[u8]) -> bool {
        let above_start = match &self.start {
            Bound::Included(s) => cmp.compare(key, s) != Ordering::Less,
            Bound::Excluded(s) => cmp.compare(key, s) == Ordering::Greater,
            Bound::Unbounded => true,
        };
        if !above_start {
            return false;
        }
        match &self.end {
            Bound::Included(e) => cmp.compare(key, e) != Ordering::Greater,
            Bound::Excluded(e) => cmp.compare(key, e) == Ordering::Less,
            Bound::Unbounded => true,
        }
    }

    /// The bound a scan in `dir` enters the range through.
    fn entry_edge(&self, dir: Direction) -> &Bound<Vec<u8>> {
        match dir {
            Direction::Forward => &self.start,
            Direction::Reverse => &self.end,
        }
    }
}

/// Object-safe view of a transaction handed to command handlers.
///
/// [`Transaction`] itself is not object safe (generic cursor type, by-value
/// commit), so handlers stored in environment configuration receive this
/// subset instead. Every [`Transaction`] implements it.
pub trait CommandAccess {
    /// Point lookup.
    fn get(&mut self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;
    /// Insert or replace.
    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;
    /// Remove a key, reporting whether it was present.
    fn delete(&mut self, key: &[u8]) -> StorageResult<bool>;
    /// Whether the transaction is read-only.
    fn is_read_only(&self) -> bool;
}

impl<T: Transaction> CommandAccess for T {
    fn get(&mut self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Transaction::get(self, key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        Transaction::put(self, key, value)
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<bool> {
        Transaction::delete(self, key)
    }

    fn is_read_only(&self) -> bool {
        Transaction::is_read_only(self)
    }
}

/// Callback stored in environment configuration and invoked by
/// [`Transaction::command`] with the active transaction and an opaque
/// payload.
pub type CommandHandler =
    Arc<dyn Fn(&mut dyn CommandAccess, &[u8]) -> StorageResult<()> + Send + Sync>;

/// A storage engine that can begin transactions over one ordered keyspace.
///
/// An engine value is the environment: it owns the backing store, the
/// configured comparator, and the optional command handler. Dropping it
/// closes the environment; the borrow checker keeps transactions from
/// outliving it.
pub trait StorageEngine: Send + Sync {
    /// Transaction type tied to the engine borrow.
    type Transaction<'a>: Transaction
    where
        Self: 'a;

    /// Begins a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot create a read snapshot.
    fn begin_read(&self) -> StorageResult<Self::Transaction<'_>>;

    /// Begins a read-write transaction.
    ///
    /// Writer concurrency is the backend's own: `redb` admits one writer at
    /// a time, the mem engine lets optimistic writers race.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a write transaction.
    fn begin_write(&self) -> StorageResult<Self::Transaction<'_>>;
}

impl<E: StorageEngine> StorageEngine for Arc<E> {
    type Transaction<'a>
        = E::Transaction<'a>
    where
        Self: 'a;

    fn begin_read(&self) -> StorageResult<Self::Transaction<'_>> {
        (**self).begin_read()
    }

    fn begin_write(&self) -> StorageResult<Self::Transaction<'_>> {
        (**self).begin_write()
    }
}

/// A transaction over one ordered keyspace.
///
/// Commit and rollback consume the transaction; dropping one without
/// committing aborts it. Cursors borrow the transaction, so the compiler
/// guarantees every cursor is gone before the transaction ends.
pub trait Transaction {
    /// Cursor type borrowing this transaction.
    type Cursor<'a>: Cursor
    where
        Self: 'a;

    /// Point lookup.
    ///
    /// # Errors
    ///
    /// Misses are `Ok(None)`; errors are backend failures or use of a reset
    /// transaction.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Inserts or replaces a key. Zero-length keys and values are valid.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] on a read-only transaction.
    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Removes a key, reporting whether it was present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadOnly`] on a read-only transaction.
    fn delete(&mut self, key: &[u8]) -> StorageResult<bool>;

    /// Opens a cursor over this transaction's view of the keyspace.
    ///
    /// The cursor starts unpositioned. Multiple cursors may coexist; each
    /// tracks its own position.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot open its table state.
    fn cursor(&self) -> StorageResult<Self::Cursor<'_>>;

    /// Commits the transaction.
    ///
    /// For a buffered child this replays its writes into the parent; the
    /// parent itself stays open.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Transaction`] if the backend commit fails;
    /// the transaction is consumed either way.
    fn commit(self) -> StorageResult<()>;

    /// Discards the transaction. Never fails meaningfully; backend abort
    /// errors are swallowed.
    ///
    /// # Errors
    ///
    /// Reserved for backends whose rollback can report failure.
    fn rollback(self) -> StorageResult<()>;

    /// Whether this transaction rejects writes.
    fn is_read_only(&self) -> bool;

    /// Releases a read-only transaction's snapshot while keeping the
    /// transaction around for [`Transaction::renew`].
    ///
    /// Idempotent on an already-reset transaction. Any other operation on a
    /// reset transaction is caller misuse.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] on a write transaction.
    fn reset(&mut self) -> StorageResult<()>;

    /// Rebinds a reset transaction to a fresh snapshot.
    ///
    /// Cursors are re-obtained afterwards; none can persist across the
    /// renewal.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] unless the transaction was
    /// reset first.
    fn renew(&mut self) -> StorageResult<()>;

    /// The environment's key comparator.
    fn comparator(&self) -> &Comparator;

    /// The environment's command handler, if one was configured.
    fn command_handler(&self) -> Option<CommandHandler> {
        None
    }

    /// Forwards an opaque payload to the environment's command handler
    /// together with this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] if no handler is
    /// configured; otherwise whatever the handler returns.
    fn command(&mut self, payload: &[u8]) -> StorageResult<()>
    where
        Self: Sized,
    {
        match self.command_handler() {
            Some(handler) => handler(self, payload),
            None => Err(StorageError::InvalidArgument(
                "no command handler configured".into(),
            )),
        }
    }

    /// Begins a buffered child transaction over this one.
    ///
    /// Works uniformly on every backend: the child buffers writes and
    /// tombstones in its own temp store and merges them over this
    /// transaction's view on every read (see [`crate::overlay`]). Nothing
    /// here is touched until the child commits. Children inherit
    /// read-only-ness, and children nest.
    ///
    /// # Errors
    ///
    /// Currently infallible; fallible for parity with top-level begins.
    fn begin_child(&mut self) -> StorageResult<BufferedTransaction<'_, Self>>
    where
        Self: Sized,
    {
        BufferedTransaction::begin(self)
    }
}

/// A movable position over an ordered keyspace within one transaction.
///
/// A cursor is either positioned on an entry or unpositioned. Positioning
/// calls return an owned copy of the entry they land on; [`Cursor::current`]
/// borrows the entry in place. Running off the end in either direction
/// unpositions the cursor, and stepping an unpositioned cursor behaves like
/// [`Cursor::first`], so a scan that exhausts forward re-enters at the last
/// entry when stepped in reverse.
pub trait Cursor {
    /// The comparator ordering this cursor's keyspace.
    fn comparator(&self) -> &Comparator;

    /// Compares two keys under this cursor's comparator.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.comparator().compare(a, b)
    }

    /// The entry the cursor is positioned on, if any.
    ///
    /// Borrows are valid until the next positioning or mutating call.
    fn current(&self) -> Option<(&[u8], &[u8])>;

    /// Positions the cursor on `key` according to `seek`.
    ///
    /// `Seek::Exact` matches only the key itself; a miss returns `Ok(None)`
    /// and unpositions the cursor. `Seek::Forward` lands on the smallest key
    /// at or after the target, `Seek::Reverse` on the largest key at or
    /// before it. Equivalently for `Seek::Reverse`: find the smallest key at
    /// or after the target, step back once if that match is not exact, and
    /// fall back to the overall largest key when nothing is at or after the
    /// target.
    ///
    /// # Errors
    ///
    /// Backend failures only; misses are `Ok(None)`.
    fn seek(&mut self, key: &[u8], seek: Seek) -> CursorResult;

    /// Positions the cursor on the boundary entry in `dir`: the smallest
    /// key for [`Direction::Forward`], the largest for
    /// [`Direction::Reverse`].
    ///
    /// # Errors
    ///
    /// Backend failures only; an empty keyspace is `Ok(None)`.
    fn first(&mut self, dir: Direction) -> CursorResult;

    /// Steps to the adjacent entry in `dir`: the successor for
    /// [`Direction::Forward`], the predecessor for [`Direction::Reverse`].
    ///
    /// On an unpositioned cursor this behaves like [`Cursor::first`].
    /// Direction may change between steps at any point.
    ///
    /// # Errors
    ///
    /// Backend failures only; exhaustion is `Ok(None)`.
    fn next(&mut self, dir: Direction) -> CursorResult;

    /// Writes `key = value` through the cursor and positions it on the
    /// written entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KeyExists`] under [`PutMode::NoOverwrite`]
    /// when the key is already visible, and [`StorageError::ReadOnly`] on a
    /// read-only transaction.
    fn put(&mut self, key: &[u8], value: &[u8], mode: PutMode) -> StorageResult<()>;

    /// Deletes the entry the cursor is positioned on.
    ///
    /// Afterwards the cursor is no longer on a visible entry
    /// ([`Cursor::current`] is `None`); the next step resumes from the
    /// deleted key's position.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] if the cursor is
    /// unpositioned and [`StorageError::ReadOnly`] on a read-only
    /// transaction.
    fn del(&mut self) -> StorageResult<()>;

    /// Unpositions the cursor without touching the keyspace.
    fn clear(&mut self);

    /// Like [`Cursor::seek`], confined to `range`.
    ///
    /// A landing outside the range reports `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Same as [`Cursor::seek`].
    fn seek_in(&mut self, range: &KeyRange, key: &[u8], seek: Seek) -> CursorResult {
        let entry = self.seek(key, seek)?;
        Ok(entry.filter(|(k, _)| range.contains(self.comparator(), k)))
    }

    /// Like [`Cursor::first`], confined to `range`.
    ///
    /// # Errors
    ///
    /// Same as [`Cursor::first`].
    fn first_in(&mut self, range: &KeyRange, dir: Direction) -> CursorResult {
        let entry = match range.entry_edge(dir) {
            Bound::Unbounded => self.first(dir)?,
            Bound::Included(edge) => self.seek(edge, dir.into())?,
            Bound::Excluded(edge) => match self.seek(edge, dir.into())? {
                Some((k, _)) if self.compare(&k, edge) == Ordering::Equal => self.next(dir)?,
                other => other,
            },
        };
        Ok(entry.filter(|(k, _)| range.contains(self.comparator(), k)))
    }

    /// Like [`Cursor::next`], confined to `range`.
    ///
    /// The cursor itself may come to rest on the first entry outside the
    /// range; only the reported result is confined.
    ///
    /// # Errors
    ///
    /// Same as [`Cursor::next`].
    fn next_in(&mut self, range: &KeyRange, dir: Direction) -> CursorResult {
        let entry = self.next(dir)?;
        Ok(entry.filter(|(k, _)| range.contains(self.comparator(), k)))
    }
}
