//! Last-created-property cache.
//!
//! A fixed direct-mapped table keyed by `(object, property name)` that
//! remembers where in an object's property chain a name was last resolved.
//! Rows are hints, not truth: the property store re-validates every hit
//! against the chain, so a stale row can only cost a miss, never return the
//! wrong slot. Mutations that change the identity of a resolved slot
//! invalidate the matching row; the garbage collector invalidates the whole
//! table.

use crate::{heap::HeapRef, intern::StringId};

/// Number of rows; must be a power of two.
const ROWS: usize = 256;

/// Ordinal marking an empty row.
const INVALID: u16 = u16::MAX;

#[derive(Debug, Clone, Copy)]
struct Row {
    object: u32,
    name: StringId,
    /// Position of the slot in the object's property chain.
    ordinal: u16,
}

/// Rows with `ordinal == INVALID` never match, so the name here is inert.
const EMPTY_ROW: Row = Row {
    object: 0,
    name: StringId::from_index(u32::MAX),
    ordinal: INVALID,
};

/// The direct-mapped cache.
#[derive(Debug)]
pub(crate) struct LCache {
    rows: Box<[Row; ROWS]>,
}

impl LCache {
    pub(crate) fn new() -> Self {
        Self {
            rows: Box::new([EMPTY_ROW; ROWS]),
        }
    }

    fn row_index(object: HeapRef, name: StringId) -> usize {
        // Knuth multiplicative mix over both key halves.
        let hash = (object.raw().wrapping_mul(2_654_435_761)) ^ (name.index() as u32).wrapping_mul(40_503);
        (hash as usize) & (ROWS - 1)
    }

    /// Looks up the cached chain ordinal for `(object, name)`.
    pub(crate) fn lookup(&self, object: HeapRef, name: StringId) -> Option<u16> {
        let row = &self.rows[Self::row_index(object, name)];
        if row.ordinal != INVALID && row.object == object.raw() && row.name == name {
            Some(row.ordinal)
        } else {
            None
        }
    }

    /// Records a resolved slot position.
    pub(crate) fn insert(&mut self, object: HeapRef, name: StringId, ordinal: u16) {
        self.rows[Self::row_index(object, name)] = Row {
            object: object.raw(),
            name,
            ordinal,
        };
    }

    /// Drops the row for `(object, name)` if present.
    pub(crate) fn invalidate(&mut self, object: HeapRef, name: StringId) {
        let row = &mut self.rows[Self::row_index(object, name)];
        if row.object == object.raw() && row.name == name {
            *row = EMPTY_ROW;
        }
    }

    /// Drops every row. Used by the garbage collector.
    pub(crate) fn invalidate_all(&mut self) {
        *self.rows = [EMPTY_ROW; ROWS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{Heap, HeapData, NoLimitTracker};

    #[test]
    fn insert_lookup_invalidate() {
        let mut heap: Heap<NoLimitTracker> = Heap::new(NoLimitTracker);
        let object = heap.alloc(HeapData::Number(0.0)).unwrap();
        let name = StringId::from_index(7);
        let mut cache = LCache::new();

        assert_eq!(cache.lookup(object, name), None);
        cache.insert(object, name, 3);
        assert_eq!(cache.lookup(object, name), Some(3));
        cache.invalidate(object, name);
        assert_eq!(cache.lookup(object, name), None);
    }

    #[test]
    fn invalidate_all_clears_every_row() {
        let mut heap: Heap<NoLimitTracker> = Heap::new(NoLimitTracker);
        let object = heap.alloc(HeapData::Number(0.0)).unwrap();
        let mut cache = LCache::new();
        for i in 0..50 {
            cache.insert(object, StringId::from_index(i), i as u16);
        }
        cache.invalidate_all();
        for i in 0..50 {
            assert_eq!(cache.lookup(object, StringId::from_index(i)), None);
        }
    }
}
