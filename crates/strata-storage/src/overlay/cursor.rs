//! Merge cursor over a temp store and a parent view.

use std::cmp::Ordering;

use crate::engine::{
    Comparator, Cursor, CursorResult, Direction, KeyValue, PutMode, Seek, StorageError,
    StorageResult,
};

use super::tag::{encode_put, encode_tombstone, TempValue};

/// Which side of the merge the cursor's position comes from.
///
/// The state is derived from the two child positions after every
/// positioning call, never carried across calls, so it cannot drift from
/// what the children actually point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    /// Unpositioned.
    Invalid,
    /// Both sides hold the current key; the temp value shadows main's.
    Equal,
    /// The current key exists only in the temp store.
    Temp,
    /// The current entry comes from the parent's view.
    Main,
}

/// A single logical cursor merging two real ones.
///
/// `temp` walks a buffered child's tagged temp store, `main` walks the
/// parent's view of the keyspace. Every positioning call moves the two
/// children independently and then picks whichever stands on the key
/// nearest along the requested direction; on a tie the temp side wins, so
/// buffered writes shadow the parent and buffered tombstones hide it.
/// Tombstones never surface: when one would win a round, both sides that
/// hold its key are stepped past it and selection runs again.
///
/// The children need not agree on a position between calls (a direction
/// change is the common cause), so stepping first re-aligns each child
/// strictly past the merged key before selecting, re-seeking a child that
/// was left on the wrong side.
///
/// Values handed out are untagged; tags exist only inside the temp store.
/// Both children must order keys with the same [`Comparator`].
pub struct OverlayCursor<T, M> {
    temp: T,
    main: M,
    state: OverlayState,
}

/// Outcome of one selection round.
enum Pick {
    Neither,
    Main,
    Temp { tombstone: bool },
    Equal { tombstone: bool },
}

impl<T: Cursor, M: Cursor> OverlayCursor<T, M> {
    pub(crate) fn new(temp: T, main: M) -> Self {
        Self {
            temp,
            main,
            state: OverlayState::Invalid,
        }
    }

    /// The side the current position comes from.
    #[must_use]
    pub fn state(&self) -> OverlayState {
        self.state
    }

    /// Picks the winning side from wherever the two children stand,
    /// stepping through tombstones until a visible entry (or nothing)
    /// remains in `dir`.
    fn select(&mut self, dir: Direction) -> StorageResult<()> {
        loop {
            let pick = match (self.temp.current(), self.main.current()) {
                (None, None) => Pick::Neither,
                (None, Some(_)) => Pick::Main,
                (Some((_, raw)), None) => Pick::Temp {
                    tombstone: TempValue::decode(raw)?.is_tombstone(),
                },
                (Some((temp_key, raw)), Some((main_key, _))) => {
                    match dir.orient(self.temp.compare(temp_key, main_key)) {
                        Ordering::Less => Pick::Temp {
                            tombstone: TempValue::decode(raw)?.is_tombstone(),
                        },
                        Ordering::Greater => Pick::Main,
                        Ordering::Equal => Pick::Equal {
                            tombstone: TempValue::decode(raw)?.is_tombstone(),
                        },
                    }
                }
            };
            match pick {
                Pick::Neither => {
                    self.state = OverlayState::Invalid;
                    return Ok(());
                }
                Pick::Main => {
                    self.state = OverlayState::Main;
                    return Ok(());
                }
                Pick::Temp { tombstone: false } => {
                    self.state = OverlayState::Temp;
                    return Ok(());
                }
                Pick::Equal { tombstone: false } => {
                    self.state = OverlayState::Equal;
                    return Ok(());
                }
                // tombstones never surface; hop over and pick again
                Pick::Temp { tombstone: true } => {
                    self.temp.next(dir)?;
                }
                Pick::Equal { tombstone: true } => {
                    self.temp.next(dir)?;
                    self.main.next(dir)?;
                }
            }
        }
    }

    /// The key of the merged position, tombstone or not.
    fn merged_key(&self) -> Option<Vec<u8>> {
        let side = match self.state {
            OverlayState::Invalid => return None,
            OverlayState::Main => self.main.current(),
            OverlayState::Temp | OverlayState::Equal => self.temp.current(),
        };
        side.map(|(key, _)| key.to_vec())
    }

    fn snapshot(&self) -> Option<KeyValue> {
        self.current().map(|(k, v)| (k.to_vec(), v.to_vec()))
    }
}

/// Moves `cursor` strictly past `anchor` in `dir`, re-seeking when it was
/// left on the wrong side by a direction change or is unpositioned.
fn advance_past<C: Cursor>(cursor: &mut C, anchor: &[u8], dir: Direction) -> StorageResult<()> {
    let standing = cursor
        .current()
        .map(|(key, _)| dir.orient(cursor.compare(key, anchor)));
    match standing {
        // already strictly past the anchor
        Some(Ordering::Greater) => Ok(()),
        // on the anchor itself; one step suffices
        Some(Ordering::Equal) => cursor.next(dir).map(drop),
        Some(Ordering::Less) | None => match cursor.seek(anchor, dir.into())? {
            Some((key, _)) if cursor.compare(&key, anchor) == Ordering::Equal => {
                cursor.next(dir).map(drop)
            }
            _ => Ok(()),
        },
    }
}

impl<T: Cursor, M: Cursor> Cursor for OverlayCursor<T, M> {
    fn comparator(&self) -> &Comparator {
        self.temp.comparator()
    }

    fn current(&self) -> Option<(&[u8], &[u8])> {
        match self.state {
            OverlayState::Invalid => None,
            OverlayState::Main => self.main.current(),
            OverlayState::Temp | OverlayState::Equal => {
                let (key, raw) = self.temp.current()?;
                match TempValue::decode(raw) {
                    Ok(TempValue::Put(value)) => Some((key, value)),
                    // a tombstone here means a just-deleted entry
                    Ok(TempValue::Tombstone) | Err(_) => None,
                }
            }
        }
    }

    fn seek(&mut self, key: &[u8], seek: Seek) -> CursorResult {
        self.temp.seek(key, seek)?;
        self.main.seek(key, seek)?;
        match seek {
            Seek::Exact => {
                let temp_hit = match self.temp.current() {
                    Some((_, raw)) => Some(TempValue::decode(raw)?.is_tombstone()),
                    None => None,
                };
                let main_hit = self.main.current().is_some();
                self.state = match (temp_hit, main_hit) {
                    // deleted in the buffer: absent from the merged view,
                    // whatever main holds
                    (Some(true), _) => {
                        self.temp.clear();
                        self.main.clear();
                        OverlayState::Invalid
                    }
                    (Some(false), true) => OverlayState::Equal,
                    (Some(false), false) => OverlayState::Temp,
                    (None, true) => OverlayState::Main,
                    (None, false) => OverlayState::Invalid,
                };
            }
            Seek::Forward => self.select(Direction::Forward)?,
            Seek::Reverse => self.select(Direction::Reverse)?,
        }
        Ok(self.snapshot())
    }

    fn first(&mut self, dir: Direction) -> CursorResult {
        self.temp.first(dir)?;
        self.main.first(dir)?;
        self.select(dir)?;
        Ok(self.snapshot())
    }

    fn next(&mut self, dir: Direction) -> CursorResult {
        let Some(anchor) = self.merged_key() else {
            return self.first(dir);
        };
        advance_past(&mut self.temp, &anchor, dir)?;
        advance_past(&mut self.main, &anchor, dir)?;
        self.select(dir)?;
        Ok(self.snapshot())
    }

    fn put(&mut self, key: &[u8], value: &[u8], mode: PutMode) -> StorageResult<()> {
        if mode == PutMode::NoOverwrite && self.seek(key, Seek::Exact)?.is_some() {
            // the cursor now rests on the existing entry
            return Err(StorageError::KeyExists);
        }
        self.temp.put(key, &encode_put(value), PutMode::Overwrite)?;
        self.main.seek(key, Seek::Exact)?;
        self.state = if self.main.current().is_some() {
            OverlayState::Equal
        } else {
            OverlayState::Temp
        };
        Ok(())
    }

    fn del(&mut self) -> StorageResult<()> {
        let key = match self.current() {
            Some((key, _)) => key.to_vec(),
            None => {
                return Err(StorageError::InvalidArgument(
                    "cursor is not positioned on an entry".into(),
                ))
            }
        };
        // Main or Equal means the parent's view holds this key too
        let covers_main = matches!(self.state, OverlayState::Main | OverlayState::Equal);
        self.temp.put(&key, &encode_tombstone(), PutMode::Overwrite)?;
        self.state = if covers_main {
            OverlayState::Equal
        } else {
            OverlayState::Temp
        };
        Ok(())
    }

    fn clear(&mut self) {
        self.temp.clear();
        self.main.clear();
        self.state = OverlayState::Invalid;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::backends::mem::{MemCursor, MemTable};

    fn plain(rows: &[(&[u8], &[u8])]) -> RefCell<MemTable> {
        let mut table = MemTable::new(Comparator::default());
        for (key, value) in rows {
            table.insert(key, value);
        }
        RefCell::new(table)
    }

    /// `Some` stages a put, `None` a tombstone.
    fn tagged(rows: &[(&[u8], Option<&[u8]>)]) -> RefCell<MemTable> {
        let mut table = MemTable::new(Comparator::default());
        for (key, value) in rows {
            match value {
                Some(value) => table.insert(key, &encode_put(value)),
                None => table.insert(key, &encode_tombstone()),
            }
        }
        RefCell::new(table)
    }

    fn overlay<'a>(
        temp: &'a RefCell<MemTable>,
        main: &'a RefCell<MemTable>,
    ) -> OverlayCursor<MemCursor<'a>, MemCursor<'a>> {
        OverlayCursor::new(
            MemCursor::new(temp, Comparator::default(), false),
            MemCursor::new(main, Comparator::default(), false),
        )
    }

    fn keys_of<T: Cursor, M: Cursor>(
        cursor: &mut OverlayCursor<T, M>,
        dir: Direction,
    ) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut entry = cursor.first(dir).unwrap();
        while let Some((key, _)) = entry {
            out.push(key);
            entry = cursor.next(dir).unwrap();
        }
        out
    }

    #[test]
    fn merge_interleaves_both_sides() {
        let temp = tagged(&[(b"b", Some(b"2"))]);
        let main = plain(&[(b"a", b"1"), (b"c", b"3")]);
        let mut cursor = overlay(&temp, &main);

        assert_eq!(
            keys_of(&mut cursor, Direction::Forward),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
        assert_eq!(
            keys_of(&mut cursor, Direction::Reverse),
            vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]
        );
    }

    #[test]
    fn temp_shadows_main_on_equal_keys() {
        let temp = tagged(&[(b"k", Some(b"new"))]);
        let main = plain(&[(b"k", b"old")]);
        let mut cursor = overlay(&temp, &main);

        let (key, value) = cursor.first(Direction::Forward).unwrap().unwrap();
        assert_eq!(key, b"k".to_vec());
        assert_eq!(value, b"new".to_vec());
        assert_eq!(cursor.state(), OverlayState::Equal);
        assert!(cursor.next(Direction::Forward).unwrap().is_none());
    }

    #[test]
    fn tombstones_hide_main_entries_both_ways() {
        let temp = tagged(&[(b"b", None)]);
        let main = plain(&[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);
        let mut cursor = overlay(&temp, &main);

        assert_eq!(
            keys_of(&mut cursor, Direction::Forward),
            vec![b"a".to_vec(), b"c".to_vec()]
        );
        assert_eq!(
            keys_of(&mut cursor, Direction::Reverse),
            vec![b"c".to_vec(), b"a".to_vec()]
        );
    }

    #[test]
    fn boundary_tombstone_moves_first() {
        let temp = tagged(&[(b"a", None)]);
        let main = plain(&[(b"a", b"1"), (b"b", b"2")]);
        let mut cursor = overlay(&temp, &main);

        let (key, _) = cursor.first(Direction::Forward).unwrap().unwrap();
        assert_eq!(key, b"b".to_vec());
        let (key, _) = cursor.first(Direction::Reverse).unwrap().unwrap();
        assert_eq!(key, b"b".to_vec());
        assert!(cursor.next(Direction::Reverse).unwrap().is_none());
    }

    #[test]
    fn all_entries_tombstoned_reads_empty() {
        let temp = tagged(&[(b"a", None), (b"b", None)]);
        let main = plain(&[(b"a", b"1"), (b"b", b"2")]);
        let mut cursor = overlay(&temp, &main);

        assert!(cursor.first(Direction::Forward).unwrap().is_none());
        assert_eq!(cursor.state(), OverlayState::Invalid);
        assert!(cursor.first(Direction::Reverse).unwrap().is_none());
    }

    #[test]
    fn temp_only_scan_skips_its_tombstones() {
        let temp = tagged(&[(b"a", Some(b"1")), (b"b", None), (b"c", Some(b"3"))]);
        let main = plain(&[]);
        let mut cursor = overlay(&temp, &main);

        assert_eq!(
            keys_of(&mut cursor, Direction::Forward),
            vec![b"a".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn direction_reverses_mid_scan() {
        let temp = tagged(&[(b"b", Some(b"9")), (b"c", Some(b"3"))]);
        let main = plain(&[(b"a", b"1"), (b"b", b"2")]);
        let mut cursor = overlay(&temp, &main);

        let (key, _) = cursor.first(Direction::Forward).unwrap().unwrap();
        assert_eq!(key, b"a".to_vec());
        let (key, value) = cursor.next(Direction::Forward).unwrap().unwrap();
        assert_eq!(key, b"b".to_vec());
        assert_eq!(value, b"9".to_vec());

        // walk back, then forward again over the same entry
        let (key, _) = cursor.next(Direction::Reverse).unwrap().unwrap();
        assert_eq!(key, b"a".to_vec());
        let (key, value) = cursor.next(Direction::Forward).unwrap().unwrap();
        assert_eq!(key, b"b".to_vec());
        assert_eq!(value, b"9".to_vec());
        let (key, _) = cursor.next(Direction::Forward).unwrap().unwrap();
        assert_eq!(key, b"c".to_vec());
        assert!(cursor.next(Direction::Forward).unwrap().is_none());

        // exhausted forward; stepping back re-enters at the far end
        let (key, _) = cursor.next(Direction::Reverse).unwrap().unwrap();
        assert_eq!(key, b"c".to_vec());
    }

    #[test]
    fn directional_seek_resolves_across_sides() {
        let temp = tagged(&[(b"20", Some(b"t")), (b"40", None)]);
        let main = plain(&[(b"10", b"m"), (b"30", b"m"), (b"40", b"m")]);
        let mut cursor = overlay(&temp, &main);

        let (key, _) = cursor.seek(b"15", Seek::Forward).unwrap().unwrap();
        assert_eq!(key, b"20".to_vec());
        let (key, _) = cursor.seek(b"15", Seek::Reverse).unwrap().unwrap();
        assert_eq!(key, b"10".to_vec());

        // the tombstoned 40 never surfaces: forward finds nothing at or
        // after 35, reverse walks back over the tombstone to 30
        assert!(cursor.seek(b"35", Seek::Forward).unwrap().is_none());
        let (key, _) = cursor.seek(b"35", Seek::Reverse).unwrap().unwrap();
        assert_eq!(key, b"30".to_vec());
        let (key, _) = cursor.seek(b"45", Seek::Reverse).unwrap().unwrap();
        assert_eq!(key, b"30".to_vec());
        // nothing at or before 05
        assert!(cursor.seek(b"05", Seek::Reverse).unwrap().is_none());
    }

    #[test]
    fn exact_seek_honors_tombstones() {
        let temp = tagged(&[(b"b", None)]);
        let main = plain(&[(b"a", b"1"), (b"b", b"2")]);
        let mut cursor = overlay(&temp, &main);

        assert!(cursor.seek(b"b", Seek::Exact).unwrap().is_none());
        assert_eq!(cursor.state(), OverlayState::Invalid);

        // an unpositioned cursor steps from the boundary
        let (key, _) = cursor.next(Direction::Forward).unwrap().unwrap();
        assert_eq!(key, b"a".to_vec());

        let (key, value) = cursor.seek(b"a", Seek::Exact).unwrap().unwrap();
        assert_eq!(key, b"a".to_vec());
        assert_eq!(value, b"1".to_vec());
        assert_eq!(cursor.state(), OverlayState::Main);
    }

    #[test]
    fn put_modes_and_tombstone_reuse() {
        let temp = tagged(&[]);
        let main = plain(&[(b"k", b"old")]);
        let mut cursor = overlay(&temp, &main);

        let err = cursor.put(b"k", b"new", PutMode::NoOverwrite).unwrap_err();
        assert!(matches!(err, StorageError::KeyExists));
        // the failed put leaves the cursor on the existing entry
        let (_, value) = cursor.current().unwrap();
        assert_eq!(value, b"old");

        cursor.put(b"k", b"new", PutMode::Overwrite).unwrap();
        assert_eq!(cursor.state(), OverlayState::Equal);
        let (_, value) = cursor.current().unwrap();
        assert_eq!(value, b"new");

        cursor.del().unwrap();
        assert!(cursor.current().is_none());

        // the key is tombstone-hidden, so NoOverwrite succeeds again
        cursor.put(b"k", b"again", PutMode::NoOverwrite).unwrap();
        assert_eq!(cursor.state(), OverlayState::Equal);
        let (_, value) = cursor.current().unwrap();
        assert_eq!(value, b"again");
    }

    #[test]
    fn del_resumes_from_vacated_key() {
        let temp = tagged(&[]);
        let main = plain(&[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);
        let mut cursor = overlay(&temp, &main);

        cursor.seek(b"b", Seek::Exact).unwrap().unwrap();
        cursor.del().unwrap();
        assert!(cursor.current().is_none());
        assert!(cursor.del().is_err());

        let (key, _) = cursor.next(Direction::Forward).unwrap().unwrap();
        assert_eq!(key, b"c".to_vec());
        // back across the tombstone
        let (key, _) = cursor.next(Direction::Reverse).unwrap().unwrap();
        assert_eq!(key, b"a".to_vec());
    }

    #[test]
    fn empty_overlay_is_empty() {
        let temp = tagged(&[]);
        let main = plain(&[]);
        let mut cursor = overlay(&temp, &main);

        assert!(cursor.first(Direction::Forward).unwrap().is_none());
        assert!(cursor.next(Direction::Reverse).unwrap().is_none());
        assert!(cursor.seek(b"x", Seek::Reverse).unwrap().is_none());
    }
}
