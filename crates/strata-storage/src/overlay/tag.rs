//! Value tagging for the overlay temp store.
//!
//! A buffered child stages puts and deletes in one keyspace, so every
//! staged value carries a leading tag byte telling the two apart. The
//! payload of a put follows its tag; a tombstone is the tag alone.

use crate::engine::{StorageError, StorageResult};

/// Tag byte marking a pending write.
pub(crate) const TAG_PUT: u8 = b'P';

/// Tag byte marking a pending delete.
pub(crate) const TAG_DEL: u8 = b'D';

/// Decoded view of a raw temp-store value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TempValue<'a> {
    /// A pending write with its untagged payload.
    Put(&'a [u8]),
    /// A pending delete.
    Tombstone,
}

impl<'a> TempValue<'a> {
    /// Splits the tag byte off a raw temp-store value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Panic`] for a missing or unknown tag. The
    /// temp store is written only by this module, so either one means the
    /// store is corrupt.
    pub(crate) fn decode(raw: &'a [u8]) -> StorageResult<Self> {
        match raw.split_first() {
            Some((&TAG_PUT, payload)) => Ok(Self::Put(payload)),
            Some((&TAG_DEL, _)) => Ok(Self::Tombstone),
            Some((&tag, _)) => Err(StorageError::Panic(format!(
                "unknown temp store tag byte {tag:#04x}"
            ))),
            None => Err(StorageError::Panic("empty temp store value".into())),
        }
    }

    pub(crate) fn is_tombstone(self) -> bool {
        matches!(self, Self::Tombstone)
    }
}

/// Encodes a pending write.
pub(crate) fn encode_put(value: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(value.len() + 1);
    raw.push(TAG_PUT);
    raw.extend_from_slice(value);
    raw
}

/// Encodes a pending delete.
pub(crate) fn encode_tombstone() -> Vec<u8> {
    vec![TAG_DEL]
}
