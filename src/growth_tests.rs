use std::sync::atomic::Ordering;
use std::sync::Arc;

use tempfile::tempdir;

use super::*;

#[test]
fn no_growth_needed_is_a_no_op() {
    let dir = tempdir().unwrap();
    let mf = MappedFile::create(dir.path().join("t.tl"), 1024).unwrap();
    let mut local = 1024u64;

    ensure_capacity(&mf, &mut local, 512).unwrap();

    assert_eq!(local, 1024);
    assert_eq!(mf.native_header().inner().grow_lock().load(Ordering::Relaxed), 0);
}

#[test]
fn growth_doubles_until_needed_bytes_fit() {
    let dir = tempdir().unwrap();
    let mf = MappedFile::create(dir.path().join("t.tl"), 16).unwrap();
    let mut local = 16u64;

    ensure_capacity(&mf, &mut local, 100).unwrap();

    assert!(local >= 100);
    assert_eq!(local, mf.capacity_bytes());
    assert!(local.is_power_of_two() || local % 16 == 0);
}

#[test]
fn concurrent_growers_converge_without_losing_capacity() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.tl");
    let mf = Arc::new(MappedFile::create(&path, 8).unwrap());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let mf = Arc::clone(&mf);
            std::thread::spawn(move || {
                let mut local = 8u64;
                let target = 8u64 << (i % 6 + 1);
                ensure_capacity(&mf, &mut local, target).unwrap();
                local
            })
        })
        .collect();

    let mut max_local = 0u64;
    for h in handles {
        max_local = max_local.max(h.join().unwrap());
    }

    assert!(mf.capacity_bytes() >= max_local);
    assert_eq!(mf.native_header().inner().grow_lock().load(Ordering::Relaxed), 0);
}
