//! `MemStore` — the live write buffer of a single column family.
//!
//! Holds two generations of cells, `live` (currently accepting writes) and
//! `snapshot` (frozen, awaiting flush), each with its own
//! [`crate::ordered_set::OrderedCellSet`], [`crate::arena::Arena`], and
//! [`crate::time_range::TimeRangeTracker`]. A single [`RwLock`] protects the
//! *rotation* between the two: writers and readers take the read side
//! (`add`, `delete`, `update_column_value`, scanner construction,
//! `get_next_row`, `get_row_key_at_or_before`, `dump`), so many of them run
//! concurrently against whichever generation is current; only
//! [`MemStore::snapshot`] and [`MemStore::clear_snapshot`] take the write
//! side, for the brief moment needed to swap references: all state is
//! protected by a single read-write lock, with reads acquiring a read lock
//! and writes/flushes acquiring a write lock.
//!
//! Size accounting (`heap_size`, `smallest_write_seq`, delete counters) is
//! tracked with atomics rather than under the `RwLock`, since many writers
//! hold the read side concurrently and must update them without
//! serializing on each other.

pub mod scanner;
pub mod tracker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tracing::{info, trace, warn};

use crate::arena::{Arena, ArenaBytes, ArenaPool};
use crate::cell::{Cell, CellComparator, CellType};
use crate::config::{FamilyDescriptor, MemStoreConfig};
use crate::mvcc::Mvcc;
use crate::ordered_set::OrderedCellSet;
use crate::time_range::TimeRangeTracker;

pub use scanner::MemStoreScanner;
pub use tracker::RowBeforeTracker;

/// Fixed heap overhead attributed to an empty `MemStore`: its locks,
/// atomic counters, and the two (empty) ordered sets it always carries.
/// `heap_size()` never reports less than this, even immediately after a
/// `snapshot()` empties the live set.
pub const DEEP_OVERHEAD: usize = 256;

/// Approximate per-entry bookkeeping overhead charged on top of
/// [`Cell::heap_size`] for every live insert — stands in for the
/// concurrent skip list's node pointers, the kind of fixed cost HBase's
/// own `MemStore` attributes to `ClassSize.align(...)`.
pub const ENTRY_OVERHEAD: usize = 64;

/// Rounds `n` up to the nearest 8-byte boundary, the way a real allocator
/// would, before it is added to the running heap-size total.
const fn align(n: usize) -> usize {
    (n + 7) & !7
}

/// Errors `MemStore` returns to its caller. A pending, uncleared snapshot
/// and oversize arena allocations are *not* represented here — they are
/// routine, logged outcomes (`warn!`/`trace!`), not failures.
#[derive(Debug, Error)]
pub enum MemStoreError {
    /// `clear_snapshot` was called with a reference that is not the
    /// memstore's current snapshot. State is unchanged.
    #[error("clear_snapshot called with a stale or foreign snapshot reference")]
    UnexpectedSnapshot,
}

/// One generation of a memstore: an ordered set of cells, the arena (if
/// any) that owns their bytes, and the rolling timestamp window over
/// them. `live` and `snapshot` are each one of these; `snapshot()` simply
/// swaps which `Arc<Generation<C>>` plays which role.
pub struct Generation<C: CellComparator + Default + Send + Sync + 'static> {
    pub(crate) set: OrderedCellSet<C>,
    pub(crate) arena: Option<Arc<Arena>>,
    pub(crate) time_range: Mutex<TimeRangeTracker>,
}

impl<C: CellComparator + Default + Send + Sync + 'static> Generation<C> {
    pub(crate) fn new(row_prefix_bloom_length: i32, arena: Option<Arc<Arena>>) -> Self {
        Self {
            set: OrderedCellSet::new(row_prefix_bloom_length),
            arena,
            time_range: Mutex::new(TimeRangeTracker::new()),
        }
    }

    /// All cells currently in this generation, in ascending primary
    /// order. Used by `MemStore::dump` and by a flush writer consuming
    /// `get_snapshot()`'s result.
    pub fn iter(&self) -> impl Iterator<Item = Cell> + '_ {
        self.set.iterator()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn time_range(&self) -> TimeRangeTracker {
        *self.time_range.lock().expect("time range lock poisoned")
    }
}

/// The two generations currently rotated under the memstore's `RwLock`.
struct Rotating<C: CellComparator + Default + Send + Sync + 'static> {
    live: Arc<Generation<C>>,
    snapshot: Arc<Generation<C>>,
}

/// The in-memory write buffer for one column family of one region.
///
/// Generic over `C`, the [`CellComparator`] this column family was
/// configured with (one of [`crate::cell::FullKeyComparator`],
/// [`crate::cell::IgnoreTimestampComparator`],
/// [`crate::cell::IgnoreTypeComparator`]) — resolved statically since all
/// three are zero-sized types, so there is no dynamic dispatch on the hot
/// insert/scan path.
pub struct MemStore<C: CellComparator + Default + Send + Sync + 'static> {
    rotating: RwLock<Rotating<C>>,
    heap_size: AtomicU64,
    snapshot_heap_size: AtomicU64,
    smallest_write_seq: AtomicU64,
    deletes_in_live: AtomicU64,
    deletes_in_snapshot: AtomicU64,
    mvcc: Arc<Mvcc>,
    arena_pool: Arc<ArenaPool>,
    config: MemStoreConfig,
    bloom_len: i32,
}

impl<C: CellComparator + Default + Send + Sync + 'static> MemStore<C> {
    /// Creates an empty memstore for one column family, with a fixed
    /// comparator `C`, shared [`Mvcc`] controller, shared [`ArenaPool`],
    /// and the family's row-prefix Bloom filter length.
    pub fn new(
        config: MemStoreConfig,
        mvcc: Arc<Mvcc>,
        arena_pool: Arc<ArenaPool>,
        family: FamilyDescriptor,
    ) -> Self {
        let bloom_len = family.row_prefix_bloom_length;
        let live_arena = config
            .use_arena
            .then(|| Arc::new(Arena::new(Arc::clone(&arena_pool), config.arena_chunk_bytes)));

        let live = Arc::new(Generation::new(bloom_len, live_arena));
        let snapshot = Arc::new(Generation::new(bloom_len, None));

        info!(use_arena = config.use_arena, "memstore initialized");

        Self {
            rotating: RwLock::new(Rotating { live, snapshot }),
            heap_size: AtomicU64::new(DEEP_OVERHEAD as u64),
            snapshot_heap_size: AtomicU64::new(0),
            smallest_write_seq: AtomicU64::new(u64::MAX),
            deletes_in_live: AtomicU64::new(0),
            deletes_in_snapshot: AtomicU64::new(0),
            mvcc,
            arena_pool,
            config,
            bloom_len,
        }
    }

    /// Copies `cell`'s fields into `generation`'s arena, if it has one.
    /// Fields larger than one chunk (or every field, when the generation
    /// has no arena) fall back to the caller's own bytes — never an
    /// error, per the arena's oversize-allocation contract.
    fn materialize(&self, generation: &Generation<C>, cell: Cell) -> Cell {
        let Some(arena) = generation.arena.as_deref() else {
            return cell;
        };

        let copy = |bytes: ArenaBytes| -> ArenaBytes {
            arena.allocate(&bytes).map(ArenaBytes::Arena).unwrap_or(bytes)
        };

        Cell {
            row: copy(cell.row),
            family: copy(cell.family),
            qualifier: copy(cell.qualifier),
            value: copy(cell.value),
            ..cell
        }
    }

    /// CAS-shrinks `smallest_write_seq` toward `seq_num`, keeping
    /// `smallest_write_seq <= write_seq` for every cell currently in the
    /// live set as a running minimum rather than recomputed on demand.
    fn shrink_smallest_write_seq(&self, seq_num: u64) {
        let mut current = self.smallest_write_seq.load(Ordering::Acquire);
        while seq_num < current {
            match self.smallest_write_seq.compare_exchange_weak(
                current,
                seq_num,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Accounts for a freshly inserted `cell` in `generation` (always the
    /// live generation in practice): widens its time range, bumps
    /// `heap_size`, counts a delete if applicable, and shrinks
    /// `smallest_write_seq` toward `seq_num`. Returns the heap delta.
    fn record_insert(&self, generation: &Generation<C>, cell: &Cell, seq_num: u64) -> usize {
        let delta = align(ENTRY_OVERHEAD + cell.heap_size());
        self.heap_size.fetch_add(delta as u64, Ordering::AcqRel);
        generation
            .time_range
            .lock()
            .expect("time range lock poisoned")
            .update(cell.timestamp);
        if cell.cell_type.is_delete() {
            self.deletes_in_live.fetch_add(1, Ordering::AcqRel);
        }
        self.shrink_smallest_write_seq(seq_num);
        delta
    }

    /// Accounts for `cell` being physically removed from the live
    /// generation (only ever called by `update_column_value` on a
    /// shadowed prior `Put`). Returns the heap delta subtracted.
    fn record_removal(&self, cell: &Cell) -> usize {
        let delta = align(ENTRY_OVERHEAD + cell.heap_size());
        self.heap_size.fetch_sub(delta as u64, Ordering::AcqRel);
        delta
    }

    /// Clones `cell` into the live arena and inserts it into the live
    /// set. Returns the heap delta — `0` if an equal cell (under `C`)
    /// was already present, since this is a set, not a map: the original
    /// insertion's bytes remain authoritative and are never replaced.
    pub fn add(&self, cell: Cell, seq_num: u64) -> usize {
        trace!(seq_num, "add() started");
        let guard = self.rotating.read().expect("memstore lock poisoned");
        let materialized = self.materialize(&guard.live, cell);
        if guard.live.set.add(materialized.clone()) {
            self.record_insert(&guard.live, &materialized, seq_num)
        } else {
            0
        }
    }

    /// Identical insertion path to [`MemStore::add`] — the delete type is
    /// already encoded on `cell.cell_type`, so no separate handling is
    /// needed.
    pub fn delete(&self, cell: Cell, seq_num: u64) -> usize {
        trace!(seq_num, "delete() started");
        self.add(cell, seq_num)
    }

    /// In-place counter update: inserts a new `Put` cell with
    /// `write_seq = 0` (immediately visible to every reader, regardless of
    /// its own MVCC read point), then — within the same read-lock scope —
    /// removes any prior `Put` for the exact same `(row, family,
    /// qualifier)`, walking forward until the row changes. Delete cells
    /// and other qualifiers are left untouched. Returns the net heap
    /// delta, which may be negative once the removed `Put`s outweigh the
    /// new insertion.
    #[allow(clippy::too_many_arguments)]
    pub fn update_column_value(
        &self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        new_value: i64,
        now: i64,
        seq_num: u64,
    ) -> i64 {
        trace!(seq_num, now, "update_column_value() started");
        let guard = self.rotating.read().expect("memstore lock poisoned");

        let new_cell = Cell::new(
            row.to_vec(),
            family.to_vec(),
            qualifier.to_vec(),
            now,
            CellType::Put,
            new_value.to_be_bytes().to_vec(),
            0,
        );
        let materialized = self.materialize(&guard.live, new_cell);

        let mut delta: i64 = 0;
        if guard.live.set.add(materialized.clone()) {
            delta += self.record_insert(&guard.live, &materialized, seq_num) as i64;
        }

        let probe = Cell::create_first_on_row(row.to_vec(), family.to_vec(), qualifier.to_vec());
        for existing in guard.live.set.tail_range(&probe) {
            if existing.row.as_ref() != row {
                break;
            }
            let same_identity = existing.family.as_ref() == family && existing.qualifier.as_ref() == qualifier;
            if same_identity
                && existing.cell_type == CellType::Put
                && !existing.is_same_allocation(&materialized)
                && guard.live.set.remove(&existing)
            {
                delta -= self.record_removal(&existing) as i64;
            }
        }

        delta
    }

    /// The smallest cell in either generation whose row is strictly
    /// greater than `cell.row` — or the globally smallest cell, if `cell`
    /// is `None`.
    pub fn get_next_row(&self, cell: Option<&Cell>) -> Option<Cell> {
        let guard = self.rotating.read().expect("memstore lock poisoned");
        let target_row = cell.map(|c| c.row.clone());

        [&guard.live, &guard.snapshot]
            .into_iter()
            .filter_map(|generation| match &target_row {
                Some(row) => generation
                    .set
                    .tail_range(&Cell::create_first_on_row_only(row.to_vec()))
                    .find(|c| c.row.as_ref() != row.as_ref()),
                None => generation.set.iterator().next(),
            })
            .min_by(|a, b| C::default().compare(a, b))
    }

    /// Drives `tracker` through the "closest row at or before" walk: a
    /// bounded forward walk from the target row in each generation (live
    /// first, then snapshot), accumulating
    /// expired cells for in-place removal, falling back to a row-by-row
    /// backward walk when the forward pass finds nothing. See
    /// [`RowBeforeTracker`] for the capability set this drives.
    pub fn get_row_key_at_or_before(&self, tracker: &mut dyn RowBeforeTracker) {
        let guard = self.rotating.read().expect("memstore lock poisoned");
        if Self::walk_row_before(&guard.live, tracker) {
            return;
        }
        Self::walk_row_before(&guard.snapshot, tracker);
    }

    /// Runs the forward-then-backward walk against a single generation.
    /// Returns `true` iff `tracker` reported itself satisfied and the
    /// caller should stop (not also walk the next generation).
    fn walk_row_before(generation: &Generation<C>, tracker: &mut dyn RowBeforeTracker) -> bool {
        let target_row = tracker.target_key().row.clone();

        let mut found_forward = false;
        let probe = Cell::create_first_on_row_only(target_row.clone());
        for cell in generation.set.tail_range(&probe) {
            if !tracker.is_target_table(&cell) {
                break;
            }
            let first_on_row = Cell::create_first_on_row_only(cell.row.clone());
            if tracker.is_too_far(&cell, &first_on_row) {
                break;
            }
            if tracker.is_expired(&cell) {
                generation.set.remove(&cell);
                continue;
            }
            found_forward = true;
            if tracker.is_better_candidate(&cell) && tracker.handle(&cell) {
                return true;
            }
        }
        if found_forward {
            return false;
        }

        let mut anchor_row = target_row;
        loop {
            let below: Vec<Cell> = generation
                .set
                .head_range(&Cell::create_first_on_row_only(anchor_row.clone()), true)
                .collect();
            let Some(max_row) = below.iter().map(|c| c.row.clone()).max_by(|a, b| a.as_ref().cmp(b.as_ref())) else {
                return false;
            };

            let mut row_cells: Vec<Cell> = below.into_iter().filter(|c| c.row.as_ref() == max_row.as_ref()).collect();
            row_cells.sort_by(|a, b| C::default().compare(a, b));
            for cell in row_cells {
                if !tracker.is_target_table(&cell) {
                    return false;
                }
                if tracker.is_expired(&cell) {
                    generation.set.remove(&cell);
                    continue;
                }
                if tracker.is_better_candidate(&cell) && tracker.handle(&cell) {
                    return true;
                }
            }
            anchor_row = max_row;
        }
    }

    /// Rotates the live generation aside to become the snapshot,
    /// installing a fresh empty live generation (and, if arenas are
    /// enabled, a fresh [`Arena`]). A no-op (with a logged warning) if a
    /// previous snapshot has not yet been cleared; a no-op (silently) if
    /// the live set is empty.
    pub fn snapshot(&self) {
        let mut guard = self.rotating.write().expect("memstore lock poisoned");

        if !guard.snapshot.is_empty() {
            warn!("snapshot() called while a previous snapshot is still pending clear_snapshot(); ignoring");
            return;
        }
        if guard.live.is_empty() {
            return;
        }

        let new_arena = self
            .config
            .use_arena
            .then(|| Arc::new(Arena::new(Arc::clone(&self.arena_pool), self.config.arena_chunk_bytes)));

        let rows = guard.live.len();
        guard.snapshot = std::mem::replace(&mut guard.live, Arc::new(Generation::new(self.bloom_len, new_arena)));

        let previous_heap = self.heap_size.swap(DEEP_OVERHEAD as u64, Ordering::AcqRel);
        self.snapshot_heap_size
            .store(previous_heap.saturating_sub(DEEP_OVERHEAD as u64), Ordering::Release);
        let previous_deletes = self.deletes_in_live.swap(0, Ordering::AcqRel);
        self.deletes_in_snapshot.store(previous_deletes, Ordering::Release);
        self.smallest_write_seq.store(u64::MAX, Ordering::Release);

        info!(rows, "memstore snapshot rotated, ready for flush");
    }

    /// The current snapshot generation — empty unless a `snapshot()` is
    /// awaiting its matching `clear_snapshot`. The returned `Arc` is the
    /// reference `clear_snapshot` expects back.
    pub fn get_snapshot(&self) -> Arc<Generation<C>> {
        Arc::clone(&self.rotating.read().expect("memstore lock poisoned").snapshot)
    }

    /// Releases the snapshot generation named by `snapshot_ref`, which
    /// must be exactly the `Arc` most recently returned by
    /// [`MemStore::get_snapshot`] — fails with
    /// [`MemStoreError::UnexpectedSnapshot`] otherwise, leaving state
    /// untouched. The stolen arena's `close()` is called *outside* the
    /// write lock, so any pool interaction it triggers never blocks
    /// writers or readers.
    pub fn clear_snapshot(&self, snapshot_ref: &Arc<Generation<C>>) -> Result<(), MemStoreError> {
        let stolen_arena = {
            let mut guard = self.rotating.write().expect("memstore lock poisoned");
            if !Arc::ptr_eq(&guard.snapshot, snapshot_ref) {
                return Err(MemStoreError::UnexpectedSnapshot);
            }
            let old = std::mem::replace(&mut guard.snapshot, Arc::new(Generation::new(self.bloom_len, None)));
            self.snapshot_heap_size.store(0, Ordering::Release);
            self.deletes_in_snapshot.store(0, Ordering::Release);
            old.arena.clone()
        };

        if let Some(arena) = stolen_arena {
            arena.close();
        }
        info!("snapshot cleared");
        Ok(())
    }

    /// Creates one [`MemStoreScanner`] over the current live and snapshot
    /// generations, pinning both arenas. Returned as a single-element
    /// vector to match the collaborator-facing `getScanners()` contract
    /// (a region's store scanner merges one memstore scanner per
    /// memstore with its file scanners).
    pub fn get_scanners(&self) -> Vec<MemStoreScanner<C>> {
        let guard = self.rotating.read().expect("memstore lock poisoned");
        vec![MemStoreScanner::new(
            Arc::clone(&guard.live),
            Arc::clone(&guard.snapshot),
            self.mvcc.pinned_read_point(),
            self.config.memstore_reseek_linear_limit,
            self.delete_count(),
        )]
    }

    /// `true` iff the union of the live and snapshot time ranges
    /// intersects `[scan_min, scan_max]` *and* the newer of the two
    /// ranges reaches at least `oldest_unexpired_ts` — a cheap way to
    /// rule out a memstore that provably holds nothing a scan could use,
    /// without walking either set.
    pub fn should_seek(&self, scan_min: i64, scan_max: i64, oldest_unexpired_ts: i64) -> bool {
        let guard = self.rotating.read().expect("memstore lock poisoned");
        let live_tr = guard.live.time_range();
        let snapshot_tr = guard.snapshot.time_range();
        let intersects =
            live_tr.includes_time_range(scan_min, scan_max) || snapshot_tr.includes_time_range(scan_min, scan_max);
        intersects && live_tr.max().max(snapshot_tr.max()) >= oldest_unexpired_ts
    }

    /// Current live-set heap accounting. Never below [`DEEP_OVERHEAD`].
    pub fn heap_size(&self) -> u64 {
        self.heap_size.load(Ordering::Acquire)
    }

    /// `heap_size() - DEEP_OVERHEAD` — the portion attributable to actual
    /// keys rather than fixed bookkeeping.
    pub fn key_size(&self) -> u64 {
        self.heap_size().saturating_sub(DEEP_OVERHEAD as u64)
    }

    /// The size a flush writer should plan for: the frozen snapshot's
    /// heap size if a flush is in progress, otherwise the live set's
    /// `key_size()`.
    pub fn flushable_size(&self) -> u64 {
        let snapshot = self.snapshot_heap_size.load(Ordering::Acquire);
        if snapshot > 0 {
            snapshot
        } else {
            self.key_size()
        }
    }

    /// `(heap_size, key_size, flushable_size)` as one consistent read,
    /// for metrics callers that would otherwise need three separate
    /// atomic loads.
    pub fn size(&self) -> (u64, u64, u64) {
        (self.heap_size(), self.key_size(), self.flushable_size())
    }

    /// The minimum write sequence currently present in the live set, or
    /// `u64::MAX` if it is empty.
    pub fn get_smallest_write_seq(&self) -> u64 {
        self.smallest_write_seq.load(Ordering::Acquire)
    }

    /// The snapshot generation's rolling timestamp window.
    pub fn get_snapshot_time_range(&self) -> TimeRangeTracker {
        self.rotating.read().expect("memstore lock poisoned").snapshot.time_range()
    }

    /// Total delete-type cells currently tracked across both
    /// generations — used by a scanner's `passesDeleteColumnCheck`
    /// precondition.
    pub fn delete_count(&self) -> u64 {
        self.deletes_in_live.load(Ordering::Acquire) + self.deletes_in_snapshot.load(Ordering::Acquire)
    }

    /// Every cell currently in either generation, for diagnostics and
    /// tests. Not exposed as a scan path — callers needing a real scan
    /// should use [`MemStore::get_scanners`].
    pub fn dump(&self) -> Vec<Cell> {
        let guard = self.rotating.read().expect("memstore lock poisoned");
        guard.live.iter().chain(guard.snapshot.iter()).collect()
    }
}

#[cfg(test)]
mod tests;
