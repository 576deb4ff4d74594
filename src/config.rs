//! Configuration recognized by this crate.
//!
//! Loading these values from a file or environment is an out-of-scope
//! collaborator's job (the outer configuration loader); this module only
//! defines the options and their defaults.

use crate::arena::DEFAULT_CHUNK_BYTES;

/// The default cap on linear `reseek` steps before falling back to a
/// logarithmic `seek`. See [`crate::memstore::scanner::MemStoreScanner::reseek`].
pub const DEFAULT_MAX_LINEAR_RESEEKS: usize = 64;

/// Per-memstore configuration.
#[derive(Debug, Clone)]
pub struct MemStoreConfig {
    /// Enable the per-memstore arena. When `false`, cells keep their
    /// caller-provided byte buffers instead of being copied into arena
    /// chunks.
    pub use_arena: bool,

    /// Slab chunk size, in bytes.
    pub arena_chunk_bytes: usize,

    /// Arena pool high-water mark, in chunks. `0` disables pooling: every
    /// checkout allocates fresh and every check-in is dropped.
    pub arena_pool_max_chunks: usize,

    /// Cap on linear `reseek` steps before falling back to `seek`.
    pub memstore_reseek_linear_limit: usize,
}

impl Default for MemStoreConfig {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_chunk_bytes: DEFAULT_CHUNK_BYTES,
            arena_pool_max_chunks: 16,
            memstore_reseek_linear_limit: DEFAULT_MAX_LINEAR_RESEEKS,
        }
    }
}

/// Column-family-level descriptor fields this crate consumes.
///
/// A real family descriptor carries many unrelated settings (compression,
/// block size, TTL, ...); this crate only cares about the row-prefix
/// Bloom filter length.
#[derive(Debug, Clone, Copy)]
pub struct FamilyDescriptor {
    /// Prefix length, in bytes, for the row-prefix Bloom filter.
    /// `-1` disables the Bloom filter entirely (`may_contain_row_prefix`
    /// then always reports `true`).
    pub row_prefix_bloom_length: i32,
}

impl Default for FamilyDescriptor {
    fn default() -> Self {
        Self {
            row_prefix_bloom_length: -1,
        }
    }
}
