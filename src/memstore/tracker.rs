//! `RowBeforeTracker` — the caller-supplied policy `getRowKeyAtOrBefore`
//! walks against.
//!
//! Modeled as a trait rather than a small inheritance hierarchy of
//! candidate-tracking classes: a caller builds one value implementing
//! this trait per call and hands it
//! to [`crate::memstore::MemStore::get_row_key_at_or_before`], which drives
//! it through the forward-then-backward walk described there. Table
//! boundaries, expiry, and "closer candidate" comparisons are all
//! collaborator concerns this crate has no opinion about, so they live
//! entirely behind this trait instead of being hard-coded into the walk.

use crate::cell::Cell;

/// Caller-supplied policy for `getRowKeyAtOrBefore`.
///
/// `MemStore` calls these methods in the order documented on each one; none
/// of them are called concurrently with each other, so implementations are
/// free to use plain interior mutability (a `Cell`, a `RefCell`) rather
/// than anything atomic.
pub trait RowBeforeTracker {
    /// The key the walk is searching "at or before".
    fn target_key(&self) -> &Cell;

    /// `true` once `cell` has walked far enough past `first_on_row` that
    /// continuing the forward scan cannot improve on a candidate already
    /// found — stops the forward walk early.
    fn is_too_far(&self, cell: &Cell, first_on_row: &Cell) -> bool;

    /// `true` if `cell` is a tombstone (or otherwise expired) and should be
    /// skipped — and, in the forward walk, removed in place — rather than
    /// considered as a candidate.
    fn is_expired(&self, cell: &Cell) -> bool;

    /// `true` if `cell` belongs to the table/column-family scope this
    /// lookup is restricted to. `false` stops the forward walk in the set
    /// currently being scanned.
    fn is_target_table(&self, cell: &Cell) -> bool;

    /// `true` if `cell` is strictly closer to `target_key()` than whatever
    /// candidate the tracker currently holds (or if it holds none yet).
    fn is_better_candidate(&self, cell: &Cell) -> bool;

    /// Accepts `cell` as the tracker's new best candidate. Returns `true`
    /// if the tracker now considers the search satisfied and the walk
    /// (in the set currently being scanned) should stop.
    fn handle(&mut self, cell: &Cell) -> bool;
}
