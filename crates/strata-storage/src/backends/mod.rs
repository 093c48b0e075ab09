//! Storage backend implementations.
//!
//! Two engines ship with the crate: [`redb`] for durable single-file
//! storage and [`mem`] for tests, tooling, and custom comparators. Both
//! implement the same engine/transaction/cursor contract, and the overlay
//! layer in [`crate::overlay`] runs unchanged over either.

pub mod mem;
pub mod redb;

pub use self::mem::{MemCursor, MemEngine, MemTransaction};
pub use self::redb::{RedbCursor, RedbEngine, RedbTransaction};
