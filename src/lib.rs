//! # memstore-core
//!
//! The in-memory write buffer ("MemStore") of a single column family in a
//! log-structured, column-family-oriented table engine. It absorbs all
//! writes for that family (inserts, updates, deletes — modeled uniformly
//! as typed [`cell::Cell`]s), serves reads through a snapshot-consistent
//! scanner, and periodically hands its accumulated contents to an
//! external flush subsystem.
//!
//! ## Scope
//!
//! This crate is deliberately narrow. It owns the write buffer and
//! nothing else: the write-ahead log, the flusher thread, on-disk file
//! readers/writers, the higher-level store scanner that merges memstore
//! scanners with file scanners, and region/RPC coordination are all
//! out-of-scope collaborators whose interfaces this crate only consumes
//! or exposes. Durability, cross-region consistency, compaction, and
//! secondary indexes are non-goals.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        MemStore<C>                         │
//! │                                                             │
//! │   writers ── add / delete / update_column_value ──┐        │
//! │                                                     ▼        │
//! │   ┌────────────────┐   snapshot()   ┌────────────────────┐ │
//! │   │  live           │ ─────────────► │  snapshot           │ │
//! │   │  OrderedCellSet │                │  OrderedCellSet     │ │
//! │   │  + Arena        │ ◄───────────── │  + Arena            │ │
//! │   └───────┬─────────┘  (fresh, empty) └─────────┬───────────┘ │
//! │           │                                       │            │
//! │           │ get_scanners()           clear_snapshot() (after  │
//! │           ▼                           the flush completes)   │
//! │   ┌──────────────────────────────────────────────────────┐  │
//! │   │                 MemStoreScanner<C>                   │  │
//! │   │  merges live + snapshot, filtered by MVCC read point  │  │
//! │   └──────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`cell`] | The immutable `Cell` record and the three key comparators |
//! | [`time_range`] | Rolling `[min, max]` timestamp window per generation |
//! | [`arena`] | Slab allocator ("LAB") and its process-wide chunk pool |
//! | [`ordered_set`] | Concurrent ordered *set* of cells with a row-prefix Bloom filter |
//! | [`mvcc`] | Write-sequence assignment and per-thread read points |
//! | [`memstore`] | `MemStore` itself: live/snapshot rotation, size accounting, scanning |
//! | [`config`] | Recognized configuration options and their defaults |
//!
//! ## Key properties
//!
//! - **Concurrent writers, concurrent readers** — a single `RwLock` per
//!   memstore is held on its read side by writers and readers alike;
//!   only the brief live→snapshot rotation takes the write side.
//! - **Set, not map** — the underlying ordered container never replaces
//!   an equal key on re-insertion; the first write at any given key wins.
//! - **Arena-backed cells** — cell bytes are copied into large,
//!   slab-allocated chunks rather than scattered as individual heap
//!   allocations, with reference-counted scanner pins keeping a retired
//!   arena's chunks out of the pool until every scanner that might still
//!   reference them has closed.
//! - **Snapshot-consistent scanning** — a [`memstore::MemStoreScanner`]
//!   captures its live set, snapshot set, and both arenas at construction
//!   and continues to observe exactly that view, even across a concurrent
//!   flush rotation.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use memstore_core::arena::ArenaPool;
//! use memstore_core::cell::{Cell, CellType, FullKeyComparator};
//! use memstore_core::config::{FamilyDescriptor, MemStoreConfig};
//! use memstore_core::memstore::MemStore;
//! use memstore_core::mvcc::Mvcc;
//!
//! let mvcc = Arc::new(Mvcc::new());
//! let pool = Arc::new(ArenaPool::new(16));
//! let memstore: MemStore<FullKeyComparator> = MemStore::new(
//!     MemStoreConfig::default(),
//!     Arc::clone(&mvcc),
//!     pool,
//!     FamilyDescriptor::default(),
//! );
//!
//! let seq = mvcc.assign_write_seq();
//! memstore.add(
//!     Cell::new(b"row".as_slice(), b"f".as_slice(), b"q".as_slice(), 1, CellType::Put, b"v".as_slice(), seq),
//!     seq,
//! );
//!
//! let mut scanner = memstore.get_scanners().remove(0);
//! assert_eq!(scanner.next().unwrap().value.to_vec(), b"v");
//! ```

#![allow(dead_code)]

pub mod arena;
pub mod cell;
pub mod config;
pub mod memstore;
pub mod mvcc;
pub mod ordered_set;
pub mod time_range;
