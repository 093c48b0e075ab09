//! `redb`-backed storage engine.
//!
//! Durable single-file storage on the pure-Rust `redb` B-tree. The whole
//! keyspace lives in one table; transactions map directly onto `redb`'s
//! MVCC transactions, and cursors are synthesized from bounded range
//! queries since `redb` exposes none of its own.

mod engine;
mod tables;
mod transaction;

pub use engine::RedbEngine;
pub use transaction::{RedbCursor, RedbTransaction};
