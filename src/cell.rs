//! Cell — the immutable unit of storage.
//!
//! A [`Cell`] is a single versioned write: a row/family/qualifier/timestamp
//! tuple, a [`CellType`] describing what kind of write it is, a value
//! payload, and the monotonic write sequence number assigned by the MVCC
//! controller at the moment it was admitted into a memstore. Cells never
//! change after construction — updates and deletes are modeled as new
//! cells, never in-place mutation.

use std::cmp::Ordering;

use crate::arena::ArenaBytes;

/// The kind of mutation a [`Cell`] represents.
///
/// Ordering matters: within the primary comparator's "type desc" tie-break,
/// a delete of any kind must sort ahead of a `Put` at an otherwise equal
/// key, so a scanner observes the tombstone before the value it shadows.
/// `DeleteFamily` shadows the widest range of writes, so it sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CellType {
    Put = 0,
    Delete = 1,
    DeleteColumn = 2,
    DeleteFamily = 3,
}

impl CellType {
    /// True for any of the three delete variants.
    pub fn is_delete(&self) -> bool {
        !matches!(self, CellType::Put)
    }
}

/// A single immutable, versioned record.
///
/// `row`, `family`, `qualifier`, and `value` are [`ArenaBytes`] — either
/// copied into a [`crate::arena::Arena`] chunk on admission into a
/// memstore, or left in the caller's own allocation when arenas are
/// disabled or the value is too large to fit a chunk. Either way the cell
/// shares its bytes by value across comparator calls, scanner look-aheads,
/// and Bloom filter probes without re-allocating.
#[derive(Debug, Clone)]
pub struct Cell {
    pub row: ArenaBytes,
    pub family: ArenaBytes,
    pub qualifier: ArenaBytes,
    pub timestamp: i64,
    pub cell_type: CellType,
    pub value: ArenaBytes,
    pub write_seq: u64,
}

impl Cell {
    /// Builds a new cell. Callers typically pass borrowed byte slices;
    /// construction copies them into fresh, reference-counted allocations
    /// (the [`crate::arena::Arena`] is responsible for the actual
    /// long-lived backing storage once the cell is inserted).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        row: impl Into<ArenaBytes>,
        family: impl Into<ArenaBytes>,
        qualifier: impl Into<ArenaBytes>,
        timestamp: i64,
        cell_type: CellType,
        value: impl Into<ArenaBytes>,
        write_seq: u64,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            cell_type,
            value: value.into(),
            write_seq,
        }
    }

    /// Builds the smallest-possible cell for a given `(row, family,
    /// qualifier)` — used as a seek key to locate the first entry at or
    /// after a row boundary (`timestamp = i64::MAX`, `type = Put`,
    /// `write_seq = u64::MAX` so every real cell for that identity sorts
    /// after it under the primary comparator's descending timestamp/type/
    /// write_seq tie-break).
    pub fn create_first_on_row(
        row: impl Into<ArenaBytes>,
        family: impl Into<ArenaBytes>,
        qualifier: impl Into<ArenaBytes>,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp: i64::MAX,
            cell_type: CellType::Put,
            value: ArenaBytes::from(&[][..]),
            write_seq: u64::MAX,
        }
    }

    /// Builds the smallest-possible cell for a bare row, ignoring family
    /// and qualifier — used by `getNextRow`'s row-boundary seek.
    pub fn create_first_on_row_only(row: impl Into<ArenaBytes>) -> Self {
        Self::create_first_on_row(row, ArenaBytes::from(&[][..]), ArenaBytes::from(&[][..]))
    }

    /// Returns `true` iff `self` and `other` were written into the exact
    /// same backing allocation — used by `updateColumnValue` to recognize
    /// (and skip) the very cell it just inserted while scanning forward to
    /// remove shadowed prior `Put`s, without relying on value equality.
    pub fn is_same_allocation(&self, other: &Cell) -> bool {
        self.value.is_same_storage(&other.value)
    }

    /// Approximate heap footprint of this cell's variable-length fields.
    /// Used by [`crate::memstore::MemStore`] size accounting; intentionally
    /// coarse (no attempt to account for allocator bookkeeping beyond the
    /// fixed [`crate::memstore::ENTRY_OVERHEAD`] added by the caller).
    pub fn heap_size(&self) -> usize {
        self.row.len()
            + self.family.len()
            + self.qualifier.len()
            + self.value.len()
            + std::mem::size_of::<i64>() // timestamp
            + std::mem::size_of::<CellType>()
            + std::mem::size_of::<u64>() // write_seq
    }

    /// Total encoded length of the cell's key+value payload, exposed for
    /// collaborators (e.g. a flush writer) that need a size estimate
    /// independent of in-memory overhead.
    pub fn len(&self) -> usize {
        self.row.len() + self.family.len() + self.qualifier.len() + self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.row == other.row
            && self.family == other.family
            && self.qualifier == other.qualifier
            && self.timestamp == other.timestamp
            && self.cell_type == other.cell_type
            && self.write_seq == other.write_seq
    }
}
impl Eq for Cell {}

/// Compares two byte slices, ordering `a` ahead of `b` only on genuine
/// byte-wise difference — a small helper shared by all three comparators.
#[inline]
fn cmp_bytes(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// The full primary key comparator: `(row asc, family asc, qualifier asc,
/// timestamp desc, type desc, write_seq desc)`.
///
/// This is the default order for [`crate::ordered_set::OrderedCellSet`]
/// and is what gives a newly-inserted overwrite of the same user key
/// priority over older versions during a merge scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullKeyComparator;

/// Same as [`FullKeyComparator`] but ignores `timestamp` — used when
/// probing "does any version of this key exist" without caring which.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreTimestampComparator;

/// Same as [`FullKeyComparator`] but ignores `cell_type` — used when a
/// caller wants row/family/qualifier/timestamp identity without caring
/// whether the cell is a put or a delete.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreTypeComparator;

/// A total order over [`Cell`] values.
///
/// Modeled as a trait rather than relying on `Cell`'s own `Ord` impl so
/// that [`crate::ordered_set::OrderedCellSet`] can be parameterized by
/// whichever of the three comparators a column family is configured with,
/// the same way a pluggable compaction strategy lets an engine swap in a
/// different compaction family without touching call sites.
pub trait CellComparator: Send + Sync + std::fmt::Debug {
    fn compare(&self, a: &Cell, b: &Cell) -> Ordering;
}

impl CellComparator for FullKeyComparator {
    fn compare(&self, a: &Cell, b: &Cell) -> Ordering {
        cmp_bytes(&a.row, &b.row)
            .then_with(|| cmp_bytes(&a.family, &b.family))
            .then_with(|| cmp_bytes(&a.qualifier, &b.qualifier))
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| b.cell_type.cmp(&a.cell_type))
            .then_with(|| b.write_seq.cmp(&a.write_seq))
    }
}

impl CellComparator for IgnoreTimestampComparator {
    fn compare(&self, a: &Cell, b: &Cell) -> Ordering {
        cmp_bytes(&a.row, &b.row)
            .then_with(|| cmp_bytes(&a.family, &b.family))
            .then_with(|| cmp_bytes(&a.qualifier, &b.qualifier))
            .then_with(|| b.cell_type.cmp(&a.cell_type))
            .then_with(|| b.write_seq.cmp(&a.write_seq))
    }
}

impl CellComparator for IgnoreTypeComparator {
    fn compare(&self, a: &Cell, b: &Cell) -> Ordering {
        cmp_bytes(&a.row, &b.row)
            .then_with(|| cmp_bytes(&a.family, &b.family))
            .then_with(|| cmp_bytes(&a.qualifier, &b.qualifier))
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| b.write_seq.cmp(&a.write_seq))
    }
}
