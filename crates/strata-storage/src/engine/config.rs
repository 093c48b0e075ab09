//! Environment configuration.

use std::fmt;

use super::traits::{CommandHandler, Comparator};

/// Commit durability for write transactions, applied environment-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Commits are durable before `commit` returns.
    #[default]
    Immediate,
    /// Commits become durable when the engine next syncs.
    Eventual,
    /// No durability guarantee; data may be lost on crash.
    None,
}

/// Environment configuration, applied when an engine is opened.
///
/// The recognized option set is uniform across backends; each backend honors
/// what it can and documents the rest. Options that a backend cannot apply
/// at all without silently corrupting behavior (a custom comparator on
/// `redb`) are rejected at open with
/// [`crate::StorageError::NotSupported`].
///
/// ```
/// use strata_storage::{Durability, EnvConfig};
///
/// let config = EnvConfig::new()
///     .cache_size(64 * 1024 * 1024)
///     .durability(Durability::Eventual);
/// ```
#[derive(Clone, Default)]
pub struct EnvConfig {
    pub(crate) map_size: Option<u64>,
    pub(crate) cache_size: Option<usize>,
    pub(crate) txn_size: Option<u64>,
    pub(crate) durability: Durability,
    pub(crate) comparator: Option<Comparator>,
    pub(crate) command: Option<CommandHandler>,
}

impl EnvConfig {
    /// Creates a configuration with every option at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves backing-store address space upfront, in bytes.
    ///
    /// Pre-open only. Engines that size on demand (`redb`, mem) accept this
    /// as a no-op.
    #[must_use]
    pub const fn map_size(mut self, bytes: u64) -> Self {
        self.map_size = Some(bytes);
        self
    }

    /// Engine cache hint, in bytes. Applied by `redb`; ignored by mem.
    #[must_use]
    pub const fn cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = Some(bytes);
        self
    }

    /// Transaction size hint, in bytes. No bundled engine applies it.
    #[must_use]
    pub const fn txn_size(mut self, bytes: u64) -> Self {
        self.txn_size = Some(bytes);
        self
    }

    /// Commit durability for every write transaction in the environment.
    #[must_use]
    pub const fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Custom key comparator.
    ///
    /// Pre-open only; must order keys totally and never change once the
    /// keyspace holds data. The mem engine honors this; `redb` rejects it
    /// at open rather than partially applying it.
    #[must_use]
    pub fn comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// Command handler invoked by [`crate::Transaction::command`].
    #[must_use]
    pub fn command(mut self, handler: CommandHandler) -> Self {
        self.command = Some(handler);
        self
    }
}

impl fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvConfig")
            .field("map_size", &self.map_size)
            .field("cache_size", &self.cache_size)
            .field("txn_size", &self.txn_size)
            .field("durability", &self.durability)
            .field("comparator", &self.comparator.is_some())
            .field("command", &self.command.is_some())
            .finish()
    }
}
