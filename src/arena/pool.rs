//! ArenaPool — a bounded, process-wide cache of free arena chunks.
//!
//! Reusing chunks across arena rotations is the other half of the
//! fragmentation story: without a pool, every `snapshot()` would abandon
//! its old chunks to the general-purpose allocator and every new arena
//! would request fresh ones from the OS, trading one fragmentation
//! problem for another (large-object churn). The pool keeps a bounded
//! number of chunks around so the steady-state cost of a flush cycle is
//! "reset a cursor", not "allocate 2 MiB".

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

use super::Chunk;

/// A bounded cache of free [`Chunk`]s of a single fixed size.
///
/// Disabled (in the sense of never retaining anything) when
/// `max_chunks == 0` — every checkout then allocates fresh and every
/// check-in is simply dropped, which is how a memstore with arenas
/// disabled configures its (otherwise-unused) pool.
pub struct ArenaPool {
    free: Mutex<Vec<Arc<Chunk>>>,
    max_chunks: usize,
    chunks_allocated: AtomicUsize,
    chunks_reused: AtomicUsize,
}

/// Point-in-time counters useful for tests and for an embedding engine's
/// metrics surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaPoolStats {
    pub cached: usize,
    pub allocated_total: usize,
    pub reused_total: usize,
}

impl ArenaPool {
    pub fn new(max_chunks: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_chunks,
            chunks_allocated: AtomicUsize::new(0),
            chunks_reused: AtomicUsize::new(0),
        }
    }

    /// Checks out a chunk of exactly `chunk_bytes` capacity: a cached
    /// chunk of the right size if one is available, otherwise a freshly
    /// allocated one. The returned chunk's bump cursor is always reset to
    /// zero.
    pub(crate) fn checkout(&self, chunk_bytes: usize) -> Arc<Chunk> {
        let mut free = self.free.lock().unwrap();
        if let Some(pos) = free.iter().rposition(|c| c.capacity == chunk_bytes) {
            let chunk = free.swap_remove(pos);
            chunk.reset();
            self.chunks_reused.fetch_add(1, Ordering::Relaxed);
            trace!(chunk_bytes, cached_remaining = free.len(), "reused pooled chunk");
            return chunk;
        }
        drop(free);

        self.chunks_allocated.fetch_add(1, Ordering::Relaxed);
        trace!(chunk_bytes, "allocating fresh chunk");
        Arc::new(Chunk::new(chunk_bytes))
    }

    /// Returns a chunk to the pool, unless the high-water mark has
    /// already been reached, in which case it is simply dropped.
    pub(crate) fn check_in(&self, chunk: Arc<Chunk>) {
        if self.max_chunks == 0 {
            return;
        }
        let mut free = self.free.lock().unwrap();
        if free.len() < self.max_chunks {
            free.push(chunk);
        }
        // Beyond the high-water mark, the chunk is dropped here and its
        // backing storage reclaimed by the allocator once any outstanding
        // `Allocation`/`Cell` references into it are also gone.
    }

    pub fn stats(&self) -> ArenaPoolStats {
        ArenaPoolStats {
            cached: self.free.lock().unwrap().len(),
            allocated_total: self.chunks_allocated.load(Ordering::Relaxed),
            reused_total: self.chunks_reused.load(Ordering::Relaxed),
        }
    }
}
