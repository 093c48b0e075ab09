//! Core storage abstractions.
//!
//! Defines the engine/transaction/cursor contract every backend implements,
//! the error taxonomy, and environment configuration.

mod config;
mod error;
mod traits;

pub use config::{Durability, EnvConfig};
pub use error::{StorageError, StorageResult};
pub use traits::{
    CommandAccess, CommandHandler, Comparator, Cursor, CursorResult, Direction, KeyRange,
    KeyValue, PutMode, Seek, StorageEngine, Transaction,
};
