use std::sync::Arc;

use tempfile::tempdir;

use super::*;

#[test]
fn push_then_get_round_trips_varied_lengths() {
    let dir = tempdir().unwrap();
    let table = VariableTable::create(dir.path().join("msgs.tl"), 4, 16).unwrap();

    let a = table.push(b"hi").unwrap();
    let b = table.push(b"a much longer message than the first one").unwrap();
    let c = table.push(b"").unwrap();

    assert_eq!(table.get(a).unwrap(), b"hi");
    assert_eq!(table.get(b).unwrap(), b"a much longer message than the first one");
    assert_eq!(table.get(c).unwrap(), b"");
    assert_eq!(table.record_count(), 3);
}

#[test]
fn size_and_capacity_report_record_count_and_heap_bytes_as_a_pair() {
    let dir = tempdir().unwrap();
    let table = VariableTable::create(dir.path().join("msgs.tl"), 4, 16).unwrap();
    table.push(b"12345678").unwrap();

    let (records, heap_bytes) = table.size();
    assert_eq!(records, 1);
    assert_eq!(heap_bytes, 8);

    let (index_slots, heap_capacity) = table.capacity();
    assert_eq!(index_slots, 4);
    assert_eq!(heap_capacity, 16);
}

#[test]
fn creates_an_idb_sibling_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("msgs.tl");
    let _table = VariableTable::create(&path, 4, 16).unwrap();

    let sibling = dir.path().join("msgs.tl.idb");
    assert!(sibling.exists());
}

#[test]
fn get_on_unwritten_index_is_bad_access() {
    let dir = tempdir().unwrap();
    let table = VariableTable::create(dir.path().join("msgs.tl"), 4, 16).unwrap();
    assert!(matches!(table.get(0), Err(Error::BadAccess { index: 0 })));
}

#[test]
fn push_on_a_read_only_table_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("msgs.tl");
    VariableTable::create(&path, 4, 16).unwrap();

    let table = VariableTable::open(&path, OpenMode::ReadOnly).unwrap();
    assert!(matches!(table.push(b"nope"), Err(Error::InvalidMode { .. })));
}

#[test]
fn pushing_large_records_grows_the_heap() {
    let dir = tempdir().unwrap();
    let table = VariableTable::create(dir.path().join("msgs.tl"), 8, 4).unwrap();

    let payload = vec![0xABu8; 1024];
    let idx = table.push(&payload).unwrap();
    assert_eq!(table.get(idx).unwrap(), payload);
}

#[test]
fn reopen_after_shrink_to_fit_preserves_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("msgs.tl");
    {
        let table = VariableTable::create(&path, 64, 64).unwrap();
        table.push(b"one").unwrap();
        table.push(b"two").unwrap();
        table.shrink_to_fit().unwrap();
    }

    let table = VariableTable::open(&path, OpenMode::ReadWrite).unwrap();
    assert_eq!(table.record_count(), 2);
    assert_eq!(table.get(0).unwrap(), b"one");
    assert_eq!(table.get(1).unwrap(), b"two");
}

#[test]
fn wait_blocks_until_a_concurrent_writer_publishes() {
    let dir = tempdir().unwrap();
    let table = Arc::new(VariableTable::create(dir.path().join("msgs.tl"), 4, 16).unwrap());

    let reader = {
        let table = Arc::clone(&table);
        std::thread::spawn(move || table.wait(0).unwrap())
    };

    std::thread::sleep(std::time::Duration::from_millis(50));
    table.push(b"hello").unwrap();

    assert_eq!(reader.join().unwrap(), b"hello");
}

#[test]
fn concurrent_producers_write_non_overlapping_heap_ranges() {
    let dir = tempdir().unwrap();
    let table = Arc::new(VariableTable::create(dir.path().join("msgs.tl"), 2, 2).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let table = Arc::clone(&table);
            std::thread::spawn(move || {
                let payload = vec![t as u8; 17];
                let idx = table.push(&payload).unwrap();
                (idx, payload)
            })
        })
        .collect();

    for h in handles {
        let (idx, payload) = h.join().unwrap();
        assert_eq!(table.get(idx).unwrap(), payload);
    }
    assert_eq!(table.record_count(), 8);
}
