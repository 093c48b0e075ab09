//! Strata Storage
//!
//! Transactional key-value storage over interchangeable backends, with
//! direction-aware cursors and buffered child transactions.
//!
//! # Overview
//!
//! The crate defines a small engine/transaction/cursor contract and ships
//! two implementations: a durable single-file engine on `redb` and an
//! in-memory engine with snapshot isolation. Code written against the
//! traits runs unchanged over either backend, and over a buffered child
//! transaction, whose cursor is a live merge of the child's staged writes
//! and the parent's view.
//!
//! # Core Traits
//!
//! - [`StorageEngine`] - opens read and write transactions
//! - [`Transaction`] - point reads and writes, commit and rollback,
//!   buffered children via [`Transaction::begin_child`]
//! - [`Cursor`] - ordered traversal; every positioning call takes a
//!   [`Direction`] or [`Seek`] policy, and a scan may turn around at any
//!   entry
//!
//! # Buffered children
//!
//! [`overlay::BufferedTransaction`] nests a transaction inside any other:
//! writes and deletes are staged in a private temp store and merged over
//! the parent on every read through [`overlay::OverlayCursor`]. Commit
//! replays the stage into the parent in key order; rollback discards it.
//! Children nest to any depth and work identically on every backend.
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`], an alias for
//! `Result<T, StorageError>`. Misses are never errors: point reads return
//! `Ok(None)`, deletes report `Ok(false)`, and exhausted scans yield
//! `Ok(None)`.
//!
//! # Example
//!
//! ```
//! use strata_storage::backends::MemEngine;
//! use strata_storage::{StorageEngine, Transaction};
//!
//! # fn main() -> strata_storage::StorageResult<()> {
//! let engine = MemEngine::new();
//!
//! let mut txn = engine.begin_write()?;
//! txn.put(b"alpha", b"1")?;
//! txn.put(b"beta", b"2")?;
//!
//! // stage more work in a child; nothing lands until it commits
//! let mut child = txn.begin_child()?;
//! child.put(b"gamma", b"3")?;
//! child.delete(b"alpha")?;
//! child.commit()?;
//!
//! txn.commit()?;
//!
//! let txn = engine.begin_read()?;
//! assert_eq!(txn.get(b"gamma")?, Some(b"3".to_vec()));
//! assert_eq!(txn.get(b"alpha")?, None);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`engine`] - storage traits, errors, and environment configuration
//! - [`backends`] - the `redb` and in-memory engines
//! - [`overlay`] - write buffering and the merge cursor

pub mod backends;
pub mod engine;
pub mod overlay;

pub use engine::{
    CommandAccess, CommandHandler, Comparator, Cursor, CursorResult, Direction, Durability,
    EnvConfig, KeyRange, KeyValue, PutMode, Seek, StorageEngine, StorageError, StorageResult,
    Transaction,
};

pub use overlay::{BufferedTransaction, OverlayCursor, OverlayState};
