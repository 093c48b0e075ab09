//! Write buffering over any backend.
//!
//! No bundled backend supports nested transactions natively, so nesting is
//! built here once, on top of the [`Transaction`](crate::Transaction)
//! contract itself. A [`BufferedTransaction`] stages writes in a private
//! temp store keyed like the parent: each staged value carries a one-byte
//! tag marking it a pending put or a tombstone (a pending delete).
//!
//! Reads resolve against the buffer first and fall through to the parent.
//! Scans run both sides at once: [`OverlayCursor`] walks a cursor over the
//! temp store and a cursor over the parent's view, always surfacing
//! whichever entry is nearest in the scan direction, letting staged puts
//! shadow the parent on key ties and silently skipping tombstoned keys.
//! The merge is symmetric in direction and the two sides re-align on every
//! step, so a scan can turn around anywhere, exactly like a scan over a
//! plain backend cursor.
//!
//! Commit replays the buffer into the parent in key order and leaves the
//! parent open; rollback (or drop) discards the buffer. Since a child is
//! itself a [`Transaction`](crate::Transaction), children nest to any
//! depth, each level buffering over the one below.

mod cursor;
mod tag;
mod txn;


pub use cursor::{OverlayCursor, OverlayState};
pub use txn::BufferedTransaction;
