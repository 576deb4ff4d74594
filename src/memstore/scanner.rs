//! `MemStoreScanner` — a single merge-ordered view over one memstore's
//! live and snapshot sets, as of the read point captured at construction.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::cell::{Cell, CellComparator};
use crate::mvcc::PinnedReadPoint;
use crate::ordered_set::OrderedCellSet;

use super::Generation;

/// A scanner over one memstore's live and snapshot sets.
///
/// Captures `Arc` clones of both generations (and pins both arenas, if
/// present) at construction, so a concurrent `snapshot()`/`clearSnapshot()`
/// on the owning memstore never invalidates cells this scanner has already
/// handed out or is about to. The cost of that safety is staleness: a
/// scanner created before a flush rotation keeps observing the
/// pre-rotation live set even after the memstore has moved on — callers
/// that need a fresh view must obtain a new scanner via
/// `MemStore::get_scanners`.
pub struct MemStoreScanner<C: CellComparator + Default + Send + Sync + 'static> {
    live: Arc<Generation<C>>,
    snapshot: Arc<Generation<C>>,
    read_point: PinnedReadPoint,
    linear_limit: usize,
    live_buf: VecDeque<Cell>,
    snap_buf: VecDeque<Cell>,
    /// `deletesInLive + deletesInSnapshot`, captured from the owning
    /// `MemStore` at construction — the same snapshot-consistency model
    /// `live`/`snapshot`/the pinned arenas already follow.
    delete_count: u64,
    /// Number of times `reseek` has fallen through to a full `seek`
    /// because its linear step budget was exhausted — the observable
    /// counter spec.md §8 scenario S6 requires.
    reseek_fallbacks: u64,
    closed: bool,
}

impl<C: CellComparator + Default + Send + Sync + 'static> MemStoreScanner<C> {
    pub(crate) fn new(
        live: Arc<Generation<C>>,
        snapshot: Arc<Generation<C>>,
        read_point: PinnedReadPoint,
        linear_limit: usize,
        delete_count: u64,
    ) -> Self {
        if let Some(arena) = &live.arena {
            arena.pin_scanner();
        }
        if let Some(arena) = &snapshot.arena {
            arena.pin_scanner();
        }

        let mut scanner = Self {
            live,
            snapshot,
            read_point,
            linear_limit,
            live_buf: VecDeque::new(),
            snap_buf: VecDeque::new(),
            delete_count,
            reseek_fallbacks: 0,
            closed: false,
        };
        scanner.reload_from(None);
        scanner
    }

    /// Walks `set` lazily from `from` (or its start) filtering to visible
    /// cells, buffering only what `reload_from` actually needs — `set`'s
    /// own `tail_range`/`iterator` are live, weakly consistent views, not
    /// pre-materialized snapshots; boxing here is just to unify the two
    /// branches' opaque iterator types, not an eager collect.
    fn visible_from<'a>(
        set: &'a OrderedCellSet<C>,
        from: Option<&Cell>,
        read_point: u64,
    ) -> Box<dyn Iterator<Item = Cell> + 'a> {
        let iter: Box<dyn Iterator<Item = Cell> + 'a> = match from {
            Some(key) => Box::new(set.tail_range(key)),
            None => Box::new(set.iterator()),
        };
        Box::new(iter.filter(move |c| c.write_seq <= read_point))
    }

    fn reload_from(&mut self, from: Option<&Cell>) {
        let read_point = self.read_point.get();
        self.live_buf = Self::visible_from(&self.live.set, from, read_point).collect();
        self.snap_buf = Self::visible_from(&self.snapshot.set, from, read_point).collect();
    }

    /// Repositions the scanner at the first visible cell greater than or
    /// equal to `key`, via a fresh tail-range query on both sets.
    pub fn seek(&mut self, key: &Cell) -> Option<Cell> {
        if self.closed {
            return None;
        }
        self.reload_from(Some(key));
        self.peek()
    }

    /// Repositions the scanner at or after `key` with a bounded linear
    /// walk forward through the already-buffered cells — draining `live`
    /// first, then `snapshot` — falling back to a full [`Self::seek`] if
    /// the step budget is exhausted before either buffer is positioned.
    pub fn reseek(&mut self, key: &Cell) -> Option<Cell> {
        if self.closed {
            return None;
        }

        let mut budget = self.linear_limit;
        let live_positioned = Self::advance_linear(&mut self.live_buf, key, &mut budget);
        let snap_positioned =
            live_positioned && Self::advance_linear(&mut self.snap_buf, key, &mut budget);

        if !live_positioned || !snap_positioned {
            self.reseek_fallbacks += 1;
            trace!(
                linear_limit = self.linear_limit,
                total_fallbacks = self.reseek_fallbacks,
                "reseek exhausted linear budget, falling back to seek"
            );
            return self.seek(key);
        }

        self.peek()
    }

    /// Number of times `reseek` has fallen through to a full `seek` over
    /// this scanner's lifetime, because the linear step budget ran out
    /// before both buffers were positioned.
    pub fn reseek_fallback_count(&self) -> u64 {
        self.reseek_fallbacks
    }

    /// Drops cells strictly less than `key` from the front of `buf`,
    /// consuming from `budget`. Returns `true` if the buffer ended up
    /// positioned at or after `key` (including by running dry) before the
    /// budget ran out.
    fn advance_linear(buf: &mut VecDeque<Cell>, key: &Cell, budget: &mut usize) -> bool {
        while *budget > 0 {
            match buf.front() {
                Some(c) if C::default().compare(c, key) == Ordering::Less => {
                    buf.pop_front();
                    *budget -= 1;
                }
                _ => return true,
            }
        }
        matches!(buf.front(), None) || C::default().compare(buf.front().unwrap(), key) != Ordering::Less
    }

    /// The next cell this scanner would return, without consuming it.
    pub fn peek(&self) -> Option<Cell> {
        match (self.live_buf.front(), self.snap_buf.front()) {
            (Some(a), Some(b)) => {
                if C::default().compare(a, b) == Ordering::Greater {
                    Some(b.clone())
                } else {
                    Some(a.clone())
                }
            }
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        }
    }

    /// `true` iff this scanner could possibly contribute a cell within
    /// `[scan_min, scan_max]` given `oldest_unexpired_ts`, without walking
    /// either buffer.
    pub fn should_use_scanner(&self, scan_min: i64, scan_max: i64, oldest_unexpired_ts: i64) -> bool {
        let live_tr = *self.live.time_range.lock().unwrap();
        let snap_tr = *self.snapshot.time_range.lock().unwrap();
        let intersects =
            live_tr.includes_time_range(scan_min, scan_max) || snap_tr.includes_time_range(scan_min, scan_max);
        intersects && live_tr.max().max(snap_tr.max()) >= oldest_unexpired_ts
    }

    /// `true` iff this memstore holds any delete-type cell at all —
    /// `deletesInLive + deletesInSnapshot > 0`, per spec.md §4.6. This is
    /// a cheap, cell-independent precondition a store scanner consults
    /// before bothering to apply per-cell delete tracking of its own;
    /// `cell` is accepted (and ignored) only to match the collaborator
    /// interface spec.md §6 documents.
    pub fn passes_delete_column_check(&self, _cell: &Cell) -> bool {
        self.delete_count > 0
    }

    /// `false` only if neither the live nor the snapshot set's row-prefix
    /// Bloom filter could possibly contain `cell`'s row.
    pub fn passes_row_key_prefix_bloom_filter(&self, cell: &Cell) -> bool {
        self.live.set.may_contain_row_prefix(cell) || self.snapshot.set.may_contain_row_prefix(cell)
    }

    /// Always `u64::MAX` — a memstore scanner has no flushed-file sequence
    /// id to report; it represents in-memory, not-yet-durable state.
    pub fn sequence_id(&self) -> u64 {
        u64::MAX
    }

    /// Idempotent. Unpins both captured arenas, allowing their chunks back
    /// into the pool once every other pin (and the owning generation
    /// itself, if retired) has released them.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(arena) = &self.live.arena {
            arena.unpin_scanner();
        }
        if let Some(arena) = &self.snapshot.arena {
            arena.unpin_scanner();
        }
    }
}

impl<C: CellComparator + Default + Send + Sync + 'static> Drop for MemStoreScanner<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: CellComparator + Default + Send + Sync + 'static> Iterator for MemStoreScanner<C> {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        if self.closed {
            return None;
        }
        match (self.live_buf.front(), self.snap_buf.front()) {
            (Some(a), Some(b)) => {
                if C::default().compare(a, b) == Ordering::Greater {
                    self.snap_buf.pop_front()
                } else {
                    self.live_buf.pop_front()
                }
            }
            (Some(_), None) => self.live_buf.pop_front(),
            (None, Some(_)) => self.snap_buf.pop_front(),
            (None, None) => None,
        }
    }
}
