use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use tempfile::tempdir;

use super::*;
use crate::variable::VariableTable;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq, Eq)]
struct Sample {
    v: u64,
}

#[test]
fn next_stops_at_current_size_without_blocking() {
    let dir = tempdir().unwrap();
    let table: FixedTable<Sample> = FixedTable::create(dir.path().join("s.tl"), 4).unwrap();
    table.push(Sample { v: 1 }).unwrap();
    table.push(Sample { v: 2 }).unwrap();

    let mut it = TableIter::new(&table);
    assert_eq!(it.next().unwrap().unwrap(), Sample { v: 1 });
    assert_eq!(it.next().unwrap().unwrap(), Sample { v: 2 });
    assert!(it.next().is_none());
}

#[test]
fn from_index_starts_mid_table() {
    let dir = tempdir().unwrap();
    let table: FixedTable<Sample> = FixedTable::create(dir.path().join("s.tl"), 4).unwrap();
    for v in 0..5 {
        table.push(Sample { v }).unwrap();
    }

    let mut it = TableIter::from_index(&table, 3);
    assert_eq!(it.cursor(), 3);
    assert_eq!(it.next().unwrap().unwrap(), Sample { v: 3 });
    assert_eq!(it.next().unwrap().unwrap(), Sample { v: 4 });
    assert!(it.next().is_none());
}

#[test]
fn blocking_next_waits_for_a_producer() {
    let dir = tempdir().unwrap();
    let table = Arc::new(FixedTable::<Sample>::create(dir.path().join("s.tl"), 2).unwrap());

    let table_for_reader = Arc::clone(&table);
    let reader = std::thread::spawn(move || {
        let mut it = TableIter::new(&*table_for_reader);
        it.blocking_next().unwrap()
    });

    std::thread::sleep(std::time::Duration::from_millis(30));
    table.push(Sample { v: 99 }).unwrap();

    assert_eq!(reader.join().unwrap(), Sample { v: 99 });
}

#[test]
fn iterates_a_variable_table_in_order() {
    let dir = tempdir().unwrap();
    let table = VariableTable::create(dir.path().join("v.tl"), 4, 16).unwrap();
    table.push(b"a").unwrap();
    table.push(b"bb").unwrap();
    table.push(b"ccc").unwrap();

    let it = TableIter::new(&table);
    let collected: Vec<Vec<u8>> = it.map(|r| r.unwrap()).collect();
    assert_eq!(collected, vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
}
