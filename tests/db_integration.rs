//! Integration tests for the Db facade.
//!
//! These tests drive the public API end to end: persistence across
//! reopen, size limits, workloads deep enough to build multi-level trees,
//! and concurrent readers and writers.

use leafdb::{Db, Error, Options};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn create_db() -> (Db, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let db = Db::open(dir.path().join("test.db")).unwrap();
    (db, dir)
}

fn key(i: usize) -> Vec<u8> {
    format!("key-{i:08}").into_bytes()
}

fn value(i: usize) -> Vec<u8> {
    format!("value-{i}-{}", "x".repeat(i % 50)).into_bytes()
}

/// Small pseudo-random permutation source, reproducible across runs.
fn shuffled(n: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    let mut state = seed;
    for i in (1..n).rev() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let j = (state >> 33) as usize % (i + 1);
        order.swap(i, j);
    }
    order
}

// ============================================================================
// Basic behavior
// ============================================================================

/// Five keys, overwrite, delete, then a bounded range.
#[test]
fn test_basic_scenario() {
    let (db, _dir) = create_db();
    for k in ["1", "2", "3", "4", "5"] {
        assert!(db.set(k.as_bytes(), k.as_bytes()).unwrap());
    }

    let all = db.range(b"", b"").unwrap();
    let expected: Vec<_> = ["1", "2", "3", "4", "5"]
        .iter()
        .map(|k| (k.as_bytes().to_vec(), k.as_bytes().to_vec()))
        .collect();
    assert_eq!(all, expected);

    assert!(!db.set(b"1", b"4").unwrap());
    assert_eq!(db.get(b"1").unwrap(), b"4");

    db.delete(b"1").unwrap();
    assert!(matches!(db.get(b"1"), Err(Error::RecordNotFound)));

    assert_eq!(
        db.range(b"3", b"4").unwrap(),
        vec![(b"3".to_vec(), b"3".to_vec()), (b"4".to_vec(), b"4".to_vec())]
    );
}

/// Empty values are legal and distinct from a missing key.
#[test]
fn test_empty_value() {
    let (db, _dir) = create_db();
    db.set(b"k", b"").unwrap();
    assert_eq!(db.get(b"k").unwrap(), b"");
    assert_eq!(db.count().unwrap(), 1);
}

#[test]
fn test_invalid_options_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    assert!(Db::open_with_options(&path, Options::default().with_page_size(1000)).is_err());
    assert!(Db::open_with_options(&path, Options::default().with_dir_fanout(0)).is_err());
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_reopen_preserves_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");

    {
        let db = Db::open(&path).unwrap();
        for i in 0..3000 {
            db.set(&key(i), &value(i)).unwrap();
        }
        for i in (0..3000).step_by(3) {
            db.delete(&key(i)).unwrap();
        }
        db.flush().unwrap();
    }

    let db = Db::open(&path).unwrap();
    db.verify().unwrap();
    assert_eq!(db.count().unwrap(), 2000);
    for i in 0..3000 {
        match db.get(&key(i)) {
            Ok(v) => {
                assert_ne!(i % 3, 0);
                assert_eq!(v, value(i));
            }
            Err(Error::RecordNotFound) => assert_eq!(i % 3, 0),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    // The reopened file keeps growing correctly
    for i in 3000..4000 {
        db.set(&key(i), &value(i)).unwrap();
    }
    db.verify().unwrap();
    assert_eq!(db.count().unwrap(), 3000);
}

#[test]
fn test_reopen_with_other_page_size_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    {
        let db = Db::open_with_options(&path, Options::default().with_page_size(8192)).unwrap();
        db.set(b"a", b"1").unwrap();
        db.flush().unwrap();
    }

    match Db::open(&path) {
        Err(Error::PageSizeMismatch { file, requested }) => {
            assert_eq!(file, 8192);
            assert_eq!(requested, 4096);
        }
        Err(e) => panic!("expected PageSizeMismatch, got {e}"),
        Ok(_) => panic!("expected PageSizeMismatch"),
    }

    let db = Db::open_with_options(&path, Options::default().with_page_size(8192)).unwrap();
    assert_eq!(db.get(b"a").unwrap(), b"1");
}

#[test]
fn test_garbage_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    std::fs::write(&path, vec![0xABu8; 4096 * 2]).unwrap();
    assert!(matches!(Db::open(&path), Err(Error::Corrupted(_))));
}

// ============================================================================
// Size limits
// ============================================================================

#[test]
fn test_record_too_large_leaves_db_untouched() {
    let (db, _dir) = create_db();
    db.set(b"keep", b"me").unwrap();

    let big = vec![1u8; db.max_record_size()];
    assert!(matches!(db.set(b"big", &big), Err(Error::RecordTooLarge { .. })));
    assert!(matches!(db.update(b"keep", &big), Err(Error::RecordTooLarge { .. })));

    assert_eq!(db.get(b"keep").unwrap(), b"me");
    assert_eq!(db.count().unwrap(), 1);
    db.verify().unwrap();
}

#[test]
fn test_larger_pages_take_larger_records() {
    let dir = tempdir().unwrap();
    let db = Db::open_with_options(
        dir.path().join("test.db"),
        Options::default().with_page_size(16384),
    )
    .unwrap();
    assert_eq!(db.max_record_size(), (16384 - 64) / 2);

    let big = vec![9u8; 6000];
    for i in 0..50 {
        db.set(&key(i), &big).unwrap();
    }
    db.verify().unwrap();
    assert_eq!(db.range(b"", b"").unwrap().len(), 50);
}

#[test]
fn test_max_size_records_everywhere() {
    let (db, _dir) = create_db();
    let max = db.max_record_size();
    for i in (0..300).rev() {
        let k = key(i);
        let v = vec![(i % 251) as u8; max - 10 - k.len()];
        db.set(&k, &v).unwrap();
    }
    db.verify().unwrap();
    assert_eq!(db.count().unwrap(), 300);
    assert_eq!(db.get(&key(150)).unwrap()[0], 150);
}

// ============================================================================
// Workloads
// ============================================================================

#[test]
fn test_sequential_insert() {
    let (db, _dir) = create_db();
    for i in 0..20_000 {
        assert!(db.set(&key(i), &value(i)).unwrap());
    }
    db.verify().unwrap();
    assert_eq!(db.count().unwrap(), 20_000);
    assert!(db.page_statistics().unwrap().depth >= 3);

    for i in (0..20_000).step_by(101) {
        assert_eq!(db.get(&key(i)).unwrap(), value(i));
    }
}

#[test]
fn test_reverse_insert() {
    let (db, _dir) = create_db();
    for i in (0..10_000).rev() {
        db.set(&key(i), &value(i)).unwrap();
    }
    db.verify().unwrap();

    let all = db.range(b"", b"").unwrap();
    assert_eq!(all.len(), 10_000);
    for (i, (k, v)) in all.iter().enumerate() {
        assert_eq!(k, &key(i));
        assert_eq!(v, &value(i));
    }
}

#[test]
fn test_random_insert_and_delete() {
    let (db, _dir) = create_db();
    let mut model = BTreeMap::new();

    for i in shuffled(8000, 42) {
        db.set(&key(i), &value(i)).unwrap();
        model.insert(key(i), value(i));
    }
    for i in shuffled(8000, 7).into_iter().take(5000) {
        db.delete(&key(i)).unwrap();
        model.remove(&key(i));
    }
    for i in shuffled(8000, 99).into_iter().take(2000) {
        let v = format!("again-{i}").into_bytes();
        db.set(&key(i), &v).unwrap();
        model.insert(key(i), v);
    }
    db.verify().unwrap();

    let all = db.range(b"", b"").unwrap();
    let expected: Vec<_> = model.into_iter().collect();
    assert_eq!(all, expected);
}

#[test]
fn test_long_keys_build_deep_branches() {
    let (db, _dir) = create_db();
    let prefix = "p".repeat(600);
    for i in shuffled(1500, 3) {
        db.set(format!("{prefix}{i:06}").as_bytes(), b"v").unwrap();
    }
    db.verify().unwrap();
    assert!(db.page_statistics().unwrap().depth >= 3);

    let lo = format!("{prefix}{:06}", 100);
    let hi = format!("{prefix}{:06}", 199);
    assert_eq!(db.range(lo.as_bytes(), hi.as_bytes()).unwrap().len(), 100);
}

#[test]
fn test_delete_everything_then_reuse() {
    let (db, _dir) = create_db();
    for i in 0..5000 {
        db.set(&key(i), &value(i)).unwrap();
    }
    for i in shuffled(5000, 11) {
        db.delete(&key(i)).unwrap();
    }
    db.verify().unwrap();
    assert_eq!(db.count().unwrap(), 0);
    assert!(db.range(b"", b"").unwrap().is_empty());

    let stats = db.page_statistics().unwrap();
    assert_eq!(stats.depth, 1);
    assert!(stats.recycled_pages > 0);

    let total = stats.total_pages;
    for i in 0..5000 {
        db.set(&key(i), &value(i)).unwrap();
    }
    db.verify().unwrap();
    // Recycled pages are taken before the file grows
    assert!(db.page_statistics().unwrap().total_pages <= total);
}

#[test]
fn test_split_counters() {
    let (db, _dir) = create_db();
    assert_eq!(db.stats().total_splits(), 0);
    for i in 0..5000 {
        db.set(&key(i), &value(i)).unwrap();
    }
    let stats = db.stats();
    assert!(stats.leaf_splits > 0);
    assert!(stats.root_splits > 0);
    assert!(stats.pages_allocated > 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_writers_disjoint_keys() {
    let (db, _dir) = create_db();
    let db = Arc::new(db);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..1500 {
                    let k = format!("t{t}-{i:06}");
                    db.set(k.as_bytes(), &value(i)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    db.verify().unwrap();
    assert_eq!(db.count().unwrap(), 6000);
    for t in 0..4 {
        let k = format!("t{t}-{:06}", 777);
        assert_eq!(db.get(k.as_bytes()).unwrap(), value(777));
    }
}

#[test]
fn test_readers_see_consistent_ranges_during_writes() {
    let (db, _dir) = create_db();
    let db = Arc::new(db);
    for i in 0..2000 {
        db.set(&key(i), &value(i)).unwrap();
    }

    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for i in 2000..6000 {
                db.set(&key(i), &value(i)).unwrap();
                if i % 2 == 0 {
                    db.delete(&key(i - 2000)).unwrap();
                }
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for _ in 0..50 {
                    let all = db.range(b"", b"").unwrap();
                    assert!(all.windows(2).all(|w| w[0].0 < w[1].0));
                    // Odd keys below 2000 are never deleted
                    assert_eq!(db.get(&key(1)).unwrap(), value(1));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    db.verify().unwrap();
    assert_eq!(db.count().unwrap(), 4000);
}
