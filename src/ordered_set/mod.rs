//! OrderedCellSet — a concurrent ordered **set** of cells.
//!
//! "Set, not map" is the load-bearing phrase here: two cells that compare
//! equal under the configured comparator are the *same* key, and
//! inserting a second one is a no-op — the first insertion wins. This is
//! the opposite of the natural temptation to key an ordered map by
//! `(row, family, qualifier, timestamp)` and let a later `insert` replace
//! an earlier value; doing so would silently lose the `write_seq`
//! distinction two writers racing on the identical timestamp rely on.
//!
//! Built on [`crossbeam::skiplist::SkipMap`] — the concurrent ordered map
//! primitive the workspace already depends on — keyed by a
//! comparator-parameterized wrapper so one `OrderedCellSet` instance can
//! be configured with whichever of the three [`CellComparator`]
//! implementations its owning column family uses, resolved statically
//! since all three comparators are zero-sized types.

#[cfg(test)]
mod tests;

use std::marker::PhantomData;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use bloomfilter::Bloom;
use crossbeam::skiplist::SkipMap;

use crate::cell::{Cell, CellComparator};

/// A marker wrapping a [`Cell`] so it can be ordered by a particular
/// [`CellComparator`] without runtime dispatch. `C` is always one of the
/// zero-sized comparator types in [`crate::cell`].
struct Keyed<C> {
    cell: Cell,
    _comparator: PhantomData<C>,
}

impl<C> Keyed<C> {
    fn new(cell: Cell) -> Self {
        Self {
            cell,
            _comparator: PhantomData,
        }
    }
}

impl<C> Clone for Keyed<C> {
    fn clone(&self) -> Self {
        Self::new(self.cell.clone())
    }
}

impl<C: CellComparator + Default> PartialEq for Keyed<C> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}
impl<C: CellComparator + Default> Eq for Keyed<C> {}

impl<C: CellComparator + Default> PartialOrd for Keyed<C> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<C: CellComparator + Default> Ord for Keyed<C> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        C::default().compare(&self.cell, &other.cell)
    }
}

/// A sentinel value stored alongside each key so [`OrderedCellSet::add`]
/// can tell, atomically, whether *this* call performed the insertion —
/// `crossbeam`'s `get_or_insert` returns the winning entry regardless of
/// who created it, so identity of the returned `Arc` is the only way to
/// distinguish "I inserted it" from "it was already there".
type InsertMarker = Arc<()>;

/// A concurrent ordered set of cells with an optional row-prefix Bloom
/// filter, parameterized by the total order `C` used to key it.
pub struct OrderedCellSet<C: CellComparator + Default + Send + Sync + 'static> {
    map: SkipMap<Keyed<C>, InsertMarker>,
    bloom: Option<Mutex<Bloom<Vec<u8>>>>,
    bloom_prefix_len: usize,
}

/// Expected number of distinct row prefixes a set's Bloom filter is sized
/// for. This is a rough planning constant, not an enforced cap — the
/// underlying `bloomfilter` crate tolerates exceeding it with a rising
/// false-positive rate rather than failing.
const BLOOM_EXPECTED_ITEMS: usize = 4096;
const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;

impl<C: CellComparator + Default + Send + Sync + 'static> OrderedCellSet<C> {
    /// Creates an empty set. `row_prefix_bloom_length` follows the family
    /// descriptor convention: `-1` disables the Bloom filter, any
    /// non-negative value enables it with that many leading row bytes as
    /// the Bloom key (clamped to the row's actual length at insert time).
    pub fn new(row_prefix_bloom_length: i32) -> Self {
        let bloom = if row_prefix_bloom_length >= 0 {
            Some(Mutex::new(
                Bloom::new_for_fp_rate(BLOOM_EXPECTED_ITEMS, BLOOM_FALSE_POSITIVE_RATE)
                    .expect("valid bloom filter parameters"),
            ))
        } else {
            None
        };
        Self {
            map: SkipMap::new(),
            bloom,
            bloom_prefix_len: row_prefix_bloom_length.max(0) as usize,
        }
    }

    /// Inserts `cell`. Returns `true` if this call performed the
    /// insertion, `false` if an equal cell (under `C`) was already
    /// present — in which case the set is unchanged and the original
    /// insertion's bytes remain authoritative.
    pub fn add(&self, cell: Cell) -> bool {
        let marker: InsertMarker = Arc::new(());
        let row = cell.row.clone();
        let key = Keyed::<C>::new(cell);
        let entry = self.map.get_or_insert(key, Arc::clone(&marker));
        let inserted = Arc::ptr_eq(entry.value(), &marker);

        if inserted {
            if let Some(bloom) = &self.bloom {
                let end = row.len().min(self.bloom_prefix_len);
                let prefix = row[..end].to_vec();
                bloom.lock().unwrap().set(&prefix);
            }
        }

        inserted
    }

    pub fn contains(&self, cell: &Cell) -> bool {
        self.map.contains_key(&Keyed::<C>::new(cell.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Removes `cell` if present, returning whether anything was removed.
    /// `crossbeam`'s skip list supports direct, lock-free removal by key
    /// while other threads iterate, so there is no need for a
    /// Java-style "remove through the iterator that produced this
    /// element" indirection.
    pub fn remove(&self, cell: &Cell) -> bool {
        self.map.remove(&Keyed::<C>::new(cell.clone())).is_some()
    }

    /// All cells with key strictly less than `upto` (or less-than-or-
    /// equal, when `exclusive` is `false`), as a live, weakly consistent
    /// view over the underlying skip list — not a point-in-time `Vec`
    /// snapshot. Concurrent inserts or removals may or may not be
    /// reflected as the iterator is walked, and walking it never raises a
    /// concurrent-modification failure, matching `iterator()`/
    /// `descending_iterator()`.
    pub fn head_range(&self, upto: &Cell, exclusive: bool) -> impl Iterator<Item = Cell> + '_ {
        let bound = if exclusive {
            Bound::Excluded(Keyed::<C>::new(upto.clone()))
        } else {
            Bound::Included(Keyed::<C>::new(upto.clone()))
        };
        self.map.range((Bound::Unbounded, bound)).map(|e| e.key().cell.clone())
    }

    /// All cells with key greater than or equal to `from`, as the same
    /// kind of live, weakly consistent view described on
    /// [`OrderedCellSet::head_range`].
    pub fn tail_range(&self, from: &Cell) -> impl Iterator<Item = Cell> + '_ {
        let bound = Bound::Included(Keyed::<C>::new(from.clone()));
        self.map.range((bound, Bound::Unbounded)).map(|e| e.key().cell.clone())
    }

    /// Forward iteration, ascending. Weakly consistent: concurrent
    /// inserts may or may not be observed, and no
    /// concurrent-modification failure is ever raised.
    pub fn iterator(&self) -> impl Iterator<Item = Cell> + '_ {
        self.map.iter().map(|e| e.key().cell.clone())
    }

    /// Reverse iteration, descending, with the same weak-consistency
    /// guarantee as [`OrderedCellSet::iterator`].
    pub fn descending_iterator(&self) -> impl Iterator<Item = Cell> + '_ {
        self.map.iter().rev().map(|e| e.key().cell.clone())
    }

    /// `true` iff the row-prefix Bloom filter might contain `cell`'s row
    /// prefix. Always `true` when the Bloom filter is disabled
    /// (`row_prefix_bloom_length == -1` at construction).
    pub fn may_contain_row_prefix(&self, cell: &Cell) -> bool {
        match &self.bloom {
            None => true,
            Some(bloom) => {
                let end = cell.row.len().min(self.bloom_prefix_len);
                let prefix = cell.row[..end].to_vec();
                bloom.lock().unwrap().check(&prefix)
            }
        }
    }

    /// Returns the smallest cell in the set, if any.
    pub fn first(&self) -> Option<Cell> {
        self.map.front().map(|e| e.key().cell.clone())
    }
}

impl<C: CellComparator + Default + Send + Sync + 'static> std::fmt::Debug for OrderedCellSet<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedCellSet")
            .field("len", &self.len())
            .finish()
    }
}
