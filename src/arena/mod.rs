//! Arena ("LAB" — Local Allocation Buffer).
//!
//! A slab allocator that copies cell bytes into large, fixed-size chunks
//! instead of leaving many small, long-lived `Vec<u8>` allocations
//! scattered across the heap. This is the single biggest lever against
//! fragmentation in a write-heavy memstore: without it, every cell value
//! is its own heap allocation that outlives the general-purpose
//! allocator's ability to reclaim the space around it.
//!
//! # Lifecycle
//!
//! An [`Arena`] is created live, accepts `allocate` calls from exactly one
//! writer-side owner (the memstore under its read lock — concurrent
//! writers may all allocate into the same arena at once), and is retired
//! by a single call to [`Arena::close`] issued by the memstore under its
//! write lock during `clearSnapshot`. Retirement does not immediately
//! release the arena's chunks: any [`Arena::pin_scanner`] call taken out
//! by a still-open `MemStoreScanner` defers the chunk release until the
//! matching `unpin_scanner` brings the pin count back to zero.
//!
//! # Safety contract
//!
//! Chunks returned to the [`crate::arena::pool::ArenaPool`] are reused for
//! fresh allocations — their bump cursor is reset and new writes land at
//! the same byte offsets earlier cells occupied. This is only sound once
//! every [`Cell`](crate::cell::Cell) that pointed into the old chunk has
//! gone out of scope, which is exactly what the pin/unpin/close protocol
//! above guarantees *if callers respect it*: a chunk must never be
//! recycled while any scanner that might still hand out cells backed by
//! it remains open. Holding a `Cell` past the `close()` of the scanner
//! that produced it is a contract violation, not a checked error — the
//! same trust model the original slab allocator this is modeled on uses.

pub mod pool;


use std::cell::UnsafeCell;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

pub use pool::ArenaPool;

/// Default chunk size: 2 MiB, a typical slab size for this kind of bump
/// allocator.
pub const DEFAULT_CHUNK_BYTES: usize = 2 * 1024 * 1024;

/// Raw, fixed-capacity byte storage backing one arena chunk.
///
/// Wrapping every byte in [`UnsafeCell`] lets multiple writer threads hold
/// a shared `&Chunk` and each write into their own, disjoint, previously
/// reserved byte range without going through a lock. `Sync` is asserted
/// manually because the compiler cannot see that disjoint-range writes
/// never alias.
struct ChunkStorage {
    data: Box<[UnsafeCell<u8>]>,
}

// Safety: concurrent access is only ever to disjoint byte ranges, each
// reserved exclusively by `Chunk::try_bump` before any write occurs.
unsafe impl Sync for ChunkStorage {}

struct Chunk {
    storage: ChunkStorage,
    cursor: AtomicUsize,
    capacity: usize,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        let data: Box<[UnsafeCell<u8>]> = (0..capacity).map(|_| UnsafeCell::new(0u8)).collect();
        Self {
            storage: ChunkStorage { data },
            cursor: AtomicUsize::new(0),
            capacity,
        }
    }

    fn base_ptr(&self) -> *mut u8 {
        self.storage.data.as_ptr() as *mut u8
    }

    /// Reserves `len` contiguous bytes via an atomic bump, returning the
    /// starting offset. Returns `None` once the chunk cannot satisfy the
    /// request — the caller must then rotate to a new chunk.
    fn try_bump(&self, len: usize) -> Option<usize> {
        let mut current = self.cursor.load(Ordering::Acquire);
        loop {
            let end = current.checked_add(len)?;
            if end > self.capacity {
                return None;
            }
            match self.cursor.compare_exchange_weak(
                current,
                end,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(current),
                Err(observed) => current = observed,
            }
        }
    }

    /// # Safety
    /// `offset..offset + bytes.len()` must have been reserved by a prior
    /// `try_bump` call on this chunk and not yet written to.
    unsafe fn write(&self, offset: usize, bytes: &[u8]) {
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.base_ptr().add(offset), bytes.len());
        }
    }

    fn reset(&self) {
        self.cursor.store(0, Ordering::Release);
    }
}

/// A byte range inside one arena chunk, returned by [`Arena::allocate`].
///
/// Cheap to clone (an `Arc` bump) and derefs to `&[u8]`. Kept alive by its
/// own reference to the chunk, independent of the [`Arena`] that produced
/// it — an `Allocation` stays valid exactly as long as something holds it,
/// per the safety contract documented on the module.
#[derive(Clone)]
pub struct Allocation {
    chunk: Arc<Chunk>,
    offset: usize,
    len: usize,
}

impl Allocation {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for Allocation {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // Safety: `offset..offset+len` was exclusively reserved and fully
        // written before this Allocation was constructed; the chunk is
        // kept alive by our own `Arc` handle.
        unsafe { std::slice::from_raw_parts(self.chunk.base_ptr().add(self.offset), self.len) }
    }
}

impl AsRef<[u8]> for Allocation {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl std::fmt::Debug for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocation")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Bytes backing a [`Cell`](crate::cell::Cell) field: either arena-owned
/// (copied into a chunk) or caller-owned (arenas disabled, or the request
/// exceeded the chunk size and fell back to the original buffer).
///
/// A cell's bytes are owned by exactly one of these two places, never
/// re-copied again after admission into a memstore — the invariant made
/// explicit in the type system rather than left as a convention to
/// remember.
#[derive(Clone)]
pub enum ArenaBytes {
    Owned(Arc<[u8]>),
    Arena(Allocation),
}

impl Deref for ArenaBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ArenaBytes::Owned(b) => b,
            ArenaBytes::Arena(a) => a,
        }
    }
}

impl AsRef<[u8]> for ArenaBytes {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl PartialEq for ArenaBytes {
    fn eq(&self, other: &Self) -> bool {
        self.deref() == other.deref()
    }
}
impl Eq for ArenaBytes {}

impl std::fmt::Debug for ArenaBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self.deref(), f)
    }
}

impl From<&[u8]> for ArenaBytes {
    fn from(value: &[u8]) -> Self {
        ArenaBytes::Owned(Arc::from(value))
    }
}

impl From<Vec<u8>> for ArenaBytes {
    fn from(value: Vec<u8>) -> Self {
        ArenaBytes::Owned(Arc::from(value))
    }
}

impl ArenaBytes {
    /// Identity comparison, distinct from [`PartialEq`]: `true` only if
    /// both values were produced by the same allocation (the same `Arc`
    /// for [`ArenaBytes::Owned`], or the same chunk and offset for
    /// [`ArenaBytes::Arena`]), not merely equal byte content.
    pub fn is_same_storage(&self, other: &Self) -> bool {
        match (self, other) {
            (ArenaBytes::Owned(a), ArenaBytes::Owned(b)) => Arc::ptr_eq(a, b),
            (ArenaBytes::Arena(a), ArenaBytes::Arena(b)) => {
                Arc::ptr_eq(&a.chunk, &b.chunk) && a.offset == b.offset
            }
            _ => false,
        }
    }
}

/// Pin count and retirement flag, updated together under one lock so that
/// the "last unpin of a retired arena" and "close of an unpinned arena"
/// transitions can never both observe a zero crossing and double-release
/// the same chunk to the pool.
struct PinState {
    count: usize,
    closed: bool,
}

/// A slab allocator owned by exactly one [`crate::memstore::MemStore`]
/// live set at a time.
///
/// Keeps every chunk it has ever checked out, not just the one currently
/// accepting writes: once a chunk fills and `allocate` rotates to a fresh
/// one, the filled chunk still holds live cell bytes and must be checked
/// back in to the pool when this arena is retired, the same as the chunk
/// that was active at close time.
pub struct Arena {
    chunks: Mutex<Vec<Arc<Chunk>>>,
    chunk_bytes: usize,
    pool: Arc<ArenaPool>,
    pin_state: Mutex<PinState>,
    closed: AtomicBool,
}

impl Arena {
    /// Creates a fresh arena backed by `pool`, checking out its first
    /// chunk immediately.
    pub fn new(pool: Arc<ArenaPool>, chunk_bytes: usize) -> Self {
        let first = pool.checkout(chunk_bytes);
        Self {
            chunks: Mutex::new(vec![first]),
            chunk_bytes,
            pool,
            pin_state: Mutex::new(PinState { count: 0, closed: false }),
            closed: AtomicBool::new(false),
        }
    }

    /// Copies `bytes` into the arena, returning `None` if `bytes` is
    /// larger than one chunk (the caller keeps its own buffer in that
    /// case — oversize is a routine outcome, never an error).
    ///
    /// # Panics
    /// Panics (in debug builds, via an assertion) if called after
    /// [`Arena::close`] — the memstore must have already rotated to a new
    /// arena before this one is retired, so a post-close call indicates a
    /// caller bug, not a runtime condition to recover from.
    pub fn allocate(&self, bytes: &[u8]) -> Option<Allocation> {
        debug_assert!(
            !self.closed.load(Ordering::Acquire),
            "allocate() called after Arena::close()"
        );

        if bytes.len() > self.chunk_bytes {
            trace!(len = bytes.len(), chunk_bytes = self.chunk_bytes, "oversize allocation, caller keeps own bytes");
            return None;
        }

        loop {
            let chunk = { self.chunks.lock().unwrap().last().unwrap().clone() };

            if let Some(offset) = chunk.try_bump(bytes.len()) {
                // Safety: we exclusively reserved this byte range above.
                unsafe { chunk.write(offset, bytes) };
                return Some(Allocation {
                    chunk,
                    offset,
                    len: bytes.len(),
                });
            }

            let mut guard = self.chunks.lock().unwrap();
            if Arc::ptr_eq(guard.last().unwrap(), &chunk) {
                debug!(chunk_bytes = self.chunk_bytes, "chunk exhausted, rotating in a new chunk");
                guard.push(self.pool.checkout(self.chunk_bytes));
            }
            // Either we rotated, or another thread beat us to it — retry.
        }
    }

    /// Increments the scanner pin count, keeping this arena's chunks out
    /// of the pool until the matching [`Arena::unpin_scanner`].
    pub fn pin_scanner(&self) {
        self.pin_state.lock().unwrap().count += 1;
    }

    /// Decrements the scanner pin count. If the arena has already been
    /// retired via [`Arena::close`] and this was the last pin, returns
    /// its current chunk to the pool.
    pub fn unpin_scanner(&self) {
        let mut state = self.pin_state.lock().unwrap();
        debug_assert!(state.count > 0, "unpin_scanner() without a matching pin");
        state.count -= 1;
        if state.count == 0 && state.closed {
            self.release_to_pool();
        }
    }

    /// Marks this arena retired. Releases its chunk to the pool
    /// immediately if no scanner currently pins it; otherwise defers the
    /// release to the matching `unpin_scanner` that brings the pin count
    /// to zero. Must be called by a single owner (the memstore, under its
    /// write lock) — never concurrently with another `close()` on the
    /// same arena.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut state = self.pin_state.lock().unwrap();
        state.closed = true;
        if state.count == 0 {
            self.release_to_pool();
        }
    }

    /// Must be called with `pin_state` already locked, so the zero-pin
    /// check and the pool hand-off happen as one atomic transition — the
    /// only way to guarantee each chunk is checked in exactly once no
    /// matter which of `close`/`unpin_scanner` observes the final release.
    /// Checks in every chunk this arena ever allocated, not just the last
    /// one it was writing into.
    fn release_to_pool(&self) {
        let chunks = std::mem::take(&mut *self.chunks.lock().unwrap());
        debug!(count = chunks.len(), "arena retired and unpinned, returning chunks to pool");
        for chunk in chunks {
            self.pool.check_in(chunk);
        }
    }

    /// Number of scanners currently pinning this arena. Exposed for tests
    /// and diagnostics.
    pub fn pin_count(&self) -> usize {
        self.pin_state.lock().unwrap().count
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
