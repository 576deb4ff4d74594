use super::*;
use crate::cell::{CellType, FullKeyComparator};

fn cell(row: &str, ts: i64, ty: CellType, seq: u64) -> Cell {
    Cell::new(
        row.as_bytes(),
        b"f".as_slice(),
        b"q".as_slice(),
        ts,
        ty,
        b"v".as_slice(),
        seq,
    )
}

type Set = OrderedCellSet<FullKeyComparator>;

#[test]
fn add_returns_true_for_new_cell() {
    let set = Set::new(-1);
    assert!(set.add(cell("a", 1, CellType::Put, 1)));
    assert_eq!(set.len(), 1);
}

#[test]
fn duplicate_add_is_a_no_op_and_returns_false() {
    let set = Set::new(-1);
    assert!(set.add(cell("a", 1, CellType::Put, 1)));
    assert!(!set.add(cell("a", 1, CellType::Put, 1)));
    assert_eq!(set.len(), 1);
}

#[test]
fn set_never_overwrites_first_insertion() {
    // Two cells equal under the comparator (same row/family/qualifier/
    // timestamp/type/write_seq) but constructed with a different value —
    // the first insertion's bytes must win.
    let set = Set::new(-1);
    let first = Cell::new(
        b"r".as_slice(),
        b"f".as_slice(),
        b"q".as_slice(),
        1,
        CellType::Put,
        b"first".as_slice(),
        1,
    );
    let second = Cell::new(
        b"r".as_slice(),
        b"f".as_slice(),
        b"q".as_slice(),
        1,
        CellType::Put,
        b"second".as_slice(),
        1,
    );
    assert!(set.add(first));
    assert!(!set.add(second));
    let only = set.iterator().next().unwrap();
    assert_eq!(&*only.value, b"first");
}

#[test]
fn iteration_is_sorted_by_the_configured_comparator() {
    let set = Set::new(-1);
    set.add(cell("c", 1, CellType::Put, 1));
    set.add(cell("a", 1, CellType::Put, 2));
    set.add(cell("b", 1, CellType::Put, 3));
    let rows: Vec<_> = set
        .iterator()
        .map(|c| String::from_utf8(c.row.to_vec()).unwrap())
        .collect();
    assert_eq!(rows, vec!["a", "b", "c"]);
}

#[test]
fn descending_iterator_reverses_order() {
    let set = Set::new(-1);
    set.add(cell("a", 1, CellType::Put, 1));
    set.add(cell("b", 1, CellType::Put, 2));
    let rows: Vec<_> = set
        .descending_iterator()
        .map(|c| String::from_utf8(c.row.to_vec()).unwrap())
        .collect();
    assert_eq!(rows, vec!["b", "a"]);
}

#[test]
fn tail_range_includes_the_from_key_and_everything_after() {
    let set = Set::new(-1);
    set.add(cell("a", 1, CellType::Put, 1));
    set.add(cell("b", 1, CellType::Put, 2));
    set.add(cell("c", 1, CellType::Put, 3));
    let probe = Cell::create_first_on_row_only(b"b".as_slice());
    let rows: Vec<_> = set
        .tail_range(&probe)
        .map(|c| String::from_utf8(c.row.to_vec()).unwrap())
        .collect();
    assert_eq!(rows, vec!["b", "c"]);
}

#[test]
fn tail_range_is_a_live_view_not_a_frozen_snapshot() {
    // A row inserted after `tail_range` is called, but before the
    // returned iterator is walked, is still visible through it — the
    // range view reflects the underlying set live, rather than freezing
    // its contents at call time.
    let set = Set::new(-1);
    set.add(cell("a", 1, CellType::Put, 1));
    set.add(cell("c", 1, CellType::Put, 2));
    let probe = Cell::create_first_on_row_only(b"a".as_slice());
    let range = set.tail_range(&probe);
    set.add(cell("b", 1, CellType::Put, 3));
    let rows: Vec<_> = range.map(|c| String::from_utf8(c.row.to_vec()).unwrap()).collect();
    assert_eq!(rows, vec!["a", "b", "c"]);
}

#[test]
fn head_range_exclusive_excludes_the_boundary() {
    let set = Set::new(-1);
    set.add(cell("a", 1, CellType::Put, 1));
    set.add(cell("b", 1, CellType::Put, 2));
    set.add(cell("c", 1, CellType::Put, 3));
    let boundary = Cell::create_first_on_row_only(b"b".as_slice());
    let rows: Vec<_> = set
        .head_range(&boundary, true)
        .map(|c| String::from_utf8(c.row.to_vec()).unwrap())
        .collect();
    assert_eq!(rows, vec!["a"]);
}

#[test]
fn remove_deletes_exact_match_only() {
    let set = Set::new(-1);
    let target = cell("a", 1, CellType::Put, 1);
    set.add(target.clone());
    set.add(cell("b", 1, CellType::Put, 2));
    assert!(set.remove(&target));
    assert_eq!(set.len(), 1);
    assert!(!set.contains(&target));
}

#[test]
fn bloom_disabled_always_reports_possible_membership() {
    let set = Set::new(-1);
    let probe = cell("anything", 1, CellType::Put, 1);
    assert!(set.may_contain_row_prefix(&probe));
}

#[test]
fn bloom_enabled_reports_true_for_inserted_prefixes() {
    let set = Set::new(3);
    set.add(cell("abcdef", 1, CellType::Put, 1));
    assert!(set.may_contain_row_prefix(&cell("abcxyz", 1, CellType::Put, 2)));
}

#[test]
fn concurrent_add_of_same_key_only_one_winner() {
    use std::sync::Arc as StdArc;
    use std::thread;

    let set = StdArc::new(Set::new(-1));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let set = StdArc::clone(&set);
        handles.push(thread::spawn(move || set.add(cell("same", 1, CellType::Put, 1))));
    }
    let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|&&r| r).count(), 1);
    assert_eq!(set.len(), 1);
}
