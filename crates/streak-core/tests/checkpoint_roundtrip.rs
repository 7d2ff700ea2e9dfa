//! End-to-end checkpoint/resume over the sparse list and its live ranges,
//! driven the way the pattern automaton drives the buffer: append, branch
//! (clone), advance (extend), abandon (drop), checkpoint mid-flight, restore,
//! and keep matching.

use streak_core::snapshot::{BlobCodec, SnapshotReader, SnapshotWriter, CURRENT_VERSION};
use streak_core::{Range, SparseList};

type Row = Vec<u8>;

fn row(byte: u8) -> Row {
    vec![byte; 4]
}

/// Feeds one row to the list and advances `along` over it, discarding the
/// append's own range — what the matcher does while a partial match keeps
/// consuming input.
fn advance(list: &mut SparseList<Row>, along: &mut Range<Row>, byte: u8) {
    let unit = list.append(row(byte));
    along.extend();
    drop(unit);
}

#[test]
fn checkpoint_preserves_rows_ranges_and_lock_accounting() {
    let mut list = SparseList::new();

    // Partial match m1 spans [0, 2].
    let mut m1 = list.append(row(b'0'));
    advance(&mut list, &mut m1, b'1');
    advance(&mut list, &mut m1, b'2');

    // m2 branches off m1, then advances to [0, 3].
    let mut m2 = m1.clone();
    m2.set_tag(2);
    advance(&mut list, &mut m2, b'3');

    // m3 starts fresh at [4, 4]; row 4 is held only by it.
    let mut m3 = list.append(row(b'4'));
    m3.set_tag(3);

    assert_eq!(list.size(), 5);
    assert_eq!(list.filled(), 5);

    let mut writer = SnapshotWriter::new(BlobCodec, CURRENT_VERSION).unwrap();
    list.save(&mut writer);
    m1.save(&mut writer);
    m2.save(&mut writer);
    m3.save(&mut writer);
    let bytes = writer.into_bytes();

    let mut reader = SnapshotReader::new(&bytes, BlobCodec).unwrap();
    let mut loaded_list = SparseList::load(&mut reader).unwrap();
    let loaded_m1 = Range::load(&mut reader).unwrap();
    let loaded_m2 = Range::load(&mut reader).unwrap();
    let mut loaded_m3 = Range::load(&mut reader).unwrap();
    assert_eq!(reader.remaining(), 0);

    // The restored state matches the pre-save state exactly.
    assert_eq!(loaded_list.size(), 5);
    assert_eq!(loaded_list.filled(), 5);
    for index in 0..5 {
        assert_eq!(loaded_list.get(index), list.get(index));
    }
    assert_eq!(loaded_m1, m1);
    assert_eq!(loaded_m2, m2);
    assert_eq!(loaded_m3, m3);

    // The round trip itself changed no lock count on the source side.
    drop(m3);
    assert_eq!(list.filled(), 4);
    drop(m2);
    assert_eq!(list.filled(), 3); // row 3 was held only by m2
    drop(m1);
    assert_eq!(list.filled(), 0);

    // Restored ranges carry the restored lock counts: dropping them evicts
    // in the same pattern. m2's branch still pins [0, 2] after m1 dies.
    drop(loaded_m1);
    assert_eq!(loaded_list.filled(), 5);
    drop(loaded_m2);
    assert_eq!(loaded_list.filled(), 1);
    assert_eq!(loaded_list.get(4), Some(row(b'4')));

    // The match in flight keeps going after restore.
    advance(&mut loaded_list, &mut loaded_m3, b'5');
    assert_eq!(loaded_m3.size(), 2);
    assert_eq!(loaded_list.get(5), Some(row(b'5')));
    drop(loaded_m3);
    assert_eq!(loaded_list.filled(), 0);
    assert_eq!(loaded_list.size(), 6);
}

#[test]
fn snapshot_errors_surface_through_crate_error() {
    fn load(bytes: &[u8]) -> streak_core::Result<SparseList<Row>> {
        let mut reader = SnapshotReader::new(bytes, BlobCodec)?;
        Ok(SparseList::load(&mut reader)?)
    }

    let err = load(b"not a snapshot").unwrap_err();
    assert!(matches!(err, streak_core::Error::Snapshot(_)));
}
