use std::sync::Arc;

use super::*;
use crate::cell::FullKeyComparator;
use crate::memstore::tracker::closest::ClosestRowBeforeTracker;

type Store = MemStore<FullKeyComparator>;

fn store(config: MemStoreConfig, mvcc: Arc<Mvcc>) -> Store {
    MemStore::new(config, mvcc, Arc::new(ArenaPool::new(8)), FamilyDescriptor::default())
}

fn default_store(mvcc: Arc<Mvcc>) -> Store {
    store(MemStoreConfig::default(), mvcc)
}

fn put(row: &str, ts: i64, value: &str, seq: u64) -> Cell {
    Cell::new(row.as_bytes(), b"f".as_slice(), b"q".as_slice(), ts, CellType::Put, value.as_bytes(), seq)
}

#[test]
fn s1_basic_visibility_respects_mvcc_and_timestamp_order() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = default_store(Arc::clone(&mvcc));

    // Three writers assign write sequences out of band, as the WAL would.
    let s1 = mvcc.assign_write_seq();
    let s2 = mvcc.assign_write_seq();

    ms.add(put("r1", 1, "v1", s1), s1);
    ms.add(put("r1", 2, "v2", s2), s2);

    // A reader's read point is pinned here, before the third write's
    // sequence is even assigned: it sees the first two writes, not the
    // third.
    let mut scanner = ms.get_scanners().remove(0);
    let s3 = mvcc.assign_write_seq();
    ms.add(put("r1", 3, "v3", s3), s3);

    let values: Vec<String> = scanner.by_ref().map(|c| String::from_utf8(c.value.to_vec()).unwrap()).collect();
    assert_eq!(values, vec!["v2", "v1"]); // timestamp desc within the row
}

#[test]
fn s2_snapshot_handoff_and_clear() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = default_store(Arc::clone(&mvcc));

    for i in 0..100 {
        let seq = mvcc.assign_write_seq();
        ms.add(put(&format!("row-{i:04}"), 1, "v", seq), seq);
    }
    let key_size_before = ms.key_size();
    assert!(key_size_before > 0);

    ms.snapshot();
    assert_eq!(ms.key_size(), 0);
    assert_eq!(ms.flushable_size(), key_size_before);

    for i in 100..110 {
        let seq = mvcc.assign_write_seq();
        ms.add(put(&format!("row-{i:04}"), 1, "v", seq), seq);
    }

    let scanner = ms.get_scanners().remove(0);
    assert_eq!(scanner.count(), 110);

    let snapshot_ref = ms.get_snapshot();
    ms.clear_snapshot(&snapshot_ref).unwrap();

    let fresh = ms.get_scanners().remove(0);
    assert_eq!(fresh.count(), 10);
}

#[test]
fn s3_double_snapshot_is_a_warned_noop() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = default_store(Arc::clone(&mvcc));

    let seq = mvcc.assign_write_seq();
    ms.add(put("a", 1, "v", seq), seq);

    ms.snapshot();
    let first = ms.get_snapshot();
    assert_eq!(ms.key_size(), 0);

    ms.snapshot(); // no-op: a snapshot is still pending clear_snapshot()
    let second = ms.get_snapshot();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(ms.key_size(), 0);
}

#[test]
fn s4_counter_upsert_leaves_exactly_one_put() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = default_store(Arc::clone(&mvcc));

    ms.update_column_value(b"r", b"f", b"q", 1, 100, mvcc.assign_write_seq());
    ms.update_column_value(b"r", b"f", b"q", 2, 101, mvcc.assign_write_seq());
    ms.update_column_value(b"r", b"f", b"q", 3, 102, mvcc.assign_write_seq());

    let cells = ms.dump();
    let puts: Vec<&Cell> = cells.iter().filter(|c| c.cell_type == CellType::Put).collect();
    assert_eq!(puts.len(), 1);
    assert_eq!(i64::from_be_bytes(puts[0].value.as_ref().try_into().unwrap()), 3);
}

#[test]
fn s4_counter_upsert_preserves_delete_cells_for_the_qualifier() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = default_store(Arc::clone(&mvcc));

    let del_seq = mvcc.assign_write_seq();
    ms.delete(
        Cell::new(b"r".as_slice(), b"f".as_slice(), b"q".as_slice(), 50, CellType::Delete, b"".as_slice(), del_seq),
        del_seq,
    );
    ms.update_column_value(b"r", b"f", b"q", 9, 100, mvcc.assign_write_seq());

    let cells = ms.dump();
    assert!(cells.iter().any(|c| c.cell_type == CellType::Delete && c.timestamp == 50));
    assert_eq!(cells.iter().filter(|c| c.cell_type == CellType::Put).count(), 1);
}

#[test]
fn s5_closest_row_at_or_before() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = default_store(Arc::clone(&mvcc));
    for row in ["a", "c", "f", "m"] {
        let seq = mvcc.assign_write_seq();
        ms.add(put(row, 1, "v", seq), seq);
    }

    let target = |row: &str| Cell::create_first_on_row_only(row.as_bytes());

    let mut tracker = ClosestRowBeforeTracker::new(target("h"));
    ms.get_row_key_at_or_before(&mut tracker);
    assert_eq!(tracker.into_result().unwrap().row.to_vec(), b"f");

    let mut tracker = ClosestRowBeforeTracker::new(target("a"));
    ms.get_row_key_at_or_before(&mut tracker);
    assert_eq!(tracker.into_result().unwrap().row.to_vec(), b"a");

    let mut tracker = ClosestRowBeforeTracker::new(target("0"));
    ms.get_row_key_at_or_before(&mut tracker);
    assert!(tracker.into_result().is_none());
}

#[test]
fn set_not_map_duplicate_insert_is_a_noop() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = default_store(Arc::clone(&mvcc));

    let seq = mvcc.assign_write_seq();
    let delta_first = ms.add(put("r", 1, "v1", seq), seq);
    assert!(delta_first > 0);

    // Same (row, family, qualifier, timestamp, type, write_seq) key.
    let delta_second = ms.add(put("r", 1, "v2", seq), seq);
    assert_eq!(delta_second, 0);

    let cells = ms.dump();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].value.to_vec(), b"v1"); // first insertion wins
}

#[test]
fn smallest_write_seq_tracks_the_minimum_live_write() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = default_store(Arc::clone(&mvcc));
    assert_eq!(ms.get_smallest_write_seq(), u64::MAX);

    let seqs: Vec<u64> = (0..5).map(|_| mvcc.assign_write_seq()).collect();
    for (i, &seq) in seqs.iter().enumerate().rev() {
        ms.add(put(&format!("r{i}"), 1, "v", seq), seq);
    }
    assert_eq!(ms.get_smallest_write_seq(), seqs[0]);

    ms.snapshot();
    assert_eq!(ms.get_smallest_write_seq(), u64::MAX);
}

#[test]
fn clear_snapshot_rejects_a_stale_reference() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = default_store(Arc::clone(&mvcc));
    let seq = mvcc.assign_write_seq();
    ms.add(put("r", 1, "v", seq), seq);
    ms.snapshot();

    let stale = ms.get_snapshot();
    ms.clear_snapshot(&stale).unwrap();

    let err = ms.clear_snapshot(&stale).unwrap_err();
    assert!(matches!(err, MemStoreError::UnexpectedSnapshot));
}

#[test]
fn clear_snapshot_returns_arena_chunks_once_scanners_release_their_pins() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = store(
        MemStoreConfig {
            arena_chunk_bytes: 4096,
            arena_pool_max_chunks: 4,
            ..MemStoreConfig::default()
        },
        Arc::clone(&mvcc),
    );

    let seq = mvcc.assign_write_seq();
    ms.add(put("r", 1, "v", seq), seq);

    let scanner = ms.get_scanners().remove(0);
    ms.snapshot();
    let snapshot_ref = ms.get_snapshot();
    ms.clear_snapshot(&snapshot_ref).unwrap();

    // The old arena is retired but still pinned by `scanner`.
    assert!(snapshot_ref.arena.as_ref().unwrap().is_closed());
    assert_eq!(snapshot_ref.arena.as_ref().unwrap().pin_count(), 1);

    drop(scanner);
    assert_eq!(snapshot_ref.arena.as_ref().unwrap().pin_count(), 0);
}

#[test]
fn should_seek_reflects_combined_time_range_and_oldest_unexpired() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = default_store(Arc::clone(&mvcc));
    assert!(!ms.should_seek(0, 100, 0));

    let seq = mvcc.assign_write_seq();
    ms.add(put("r", 50, "v", seq), seq);
    assert!(ms.should_seek(0, 100, 0));
    assert!(!ms.should_seek(60, 100, 0));
    assert!(!ms.should_seek(0, 100, 60)); // nothing as new as oldest_unexpired_ts
}

#[test]
fn get_next_row_returns_smallest_row_strictly_greater() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = default_store(Arc::clone(&mvcc));
    for row in ["a", "c", "f"] {
        let seq = mvcc.assign_write_seq();
        ms.add(put(row, 1, "v", seq), seq);
    }

    let current = Cell::create_first_on_row_only(b"c".as_slice());
    let next = ms.get_next_row(Some(&current)).unwrap();
    assert_eq!(next.row.to_vec(), b"f");

    let first = ms.get_next_row(None).unwrap();
    assert_eq!(first.row.to_vec(), b"a");

    let current = Cell::create_first_on_row_only(b"f".as_slice());
    assert!(ms.get_next_row(Some(&current)).is_none());
}

#[test]
fn reseek_over_ten_thousand_rows_falls_back_and_returns_correct_row() {
    let mvcc = Arc::new(Mvcc::new());
    let ms = store(
        MemStoreConfig {
            memstore_reseek_linear_limit: 20,
            ..MemStoreConfig::default()
        },
        Arc::clone(&mvcc),
    );

    for i in 0..10_000 {
        let seq = mvcc.assign_write_seq();
        ms.add(put(&format!("row-{i:05}"), 1, "v", seq), seq);
    }

    let mut scanner = ms.get_scanners().remove(0);
    scanner.seek(&Cell::create_first_on_row_only(b"row-00000".as_slice()));
    let target = Cell::create_first_on_row_only(b"row-00100".as_slice());
    let found = scanner.reseek(&target).unwrap();
    assert_eq!(found.row.to_vec(), b"row-00100");
    assert_eq!(
        scanner.reseek_fallback_count(),
        1,
        "reseek past the 20-step linear budget toward row 100 rows away must fall back to seek"
    );
}
