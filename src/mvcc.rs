//! MVCC controller — process-wide write-sequence assignment and
//! per-thread read points.
//!
//! Modeled as an explicit, constructable service rather than a `static`
//! or other ambient global, so tests can substitute their own instance: an
//! embedder constructs one [`Mvcc`] and shares it, via `Arc`, with every
//! [`crate::memstore::MemStore`] and every reader thread that needs a
//! read point. The memstore itself never assigns write sequences — it
//! only consumes `threadReadPoint()` while advancing a scanner, and
//! receives write sequences as the `seqNum` parameter to `add`/`delete`.

use std::cell::Cell as StdCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// A process-wide (or, in tests, per-test) MVCC coordinator.
///
/// `assign_write_seq` hands out a fresh, strictly increasing sequence
/// number to writers (typically called by the WAL-adjacent collaborator
/// that owns durability ordering, not by `MemStore` itself).
/// `thread_read_point` reports the highest write sequence the calling
/// thread is permitted to observe "as of now" — a cell with
/// `write_seq > read_point` is invisible to it.
#[derive(Debug)]
pub struct Mvcc {
    next_write_seq: AtomicU64,
}

impl Default for Mvcc {
    fn default() -> Self {
        Self::new()
    }
}

impl Mvcc {
    pub fn new() -> Self {
        Self {
            next_write_seq: AtomicU64::new(1),
        }
    }

    /// Assigns and returns the next write sequence number.
    pub fn assign_write_seq(&self) -> u64 {
        self.next_write_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// The read point a reader on the calling thread should use: the
    /// highest write sequence assigned so far. A scanner created "now"
    /// will see every write that completed before this call and none
    /// that started after it — the ordinary MVCC snapshot guarantee.
    pub fn thread_read_point(&self) -> u64 {
        self.next_write_seq.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Returns a read point pinned at construction and reusable across
    /// several scanner operations on the same thread without re-querying
    /// the shared counter each time. Threads that want a single
    /// consistent view across a whole scan should call this once, up
    /// front, rather than calling `thread_read_point` per `seek`/`next`.
    pub fn pinned_read_point(&self) -> PinnedReadPoint {
        PinnedReadPoint(StdCell::new(self.thread_read_point()))
    }
}

/// A read point captured once and reused, avoiding repeated atomic loads
/// on the shared [`Mvcc`] counter during a single scan.
#[derive(Debug)]
pub struct PinnedReadPoint(StdCell<u64>);

impl PinnedReadPoint {
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}
