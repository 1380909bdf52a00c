//! Model-based tests: random operation sequences against `BTreeMap`.
//!
//! Small key spaces force overwrites and deletes of live keys; the value
//! sizes reach far enough to split pages after a few dozen operations.
//! Padded keys keep few entries per branch page, so deletes reach
//! branches below the root.

use leafdb::{Db, Error, Options};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Op {
    Set(u16, usize),
    Delete(u16),
    Get(u16),
    Range(u16, u16),
}

fn op_strategy(keys: u16, max_value: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..keys, 0..max_value).prop_map(|(k, len)| Op::Set(k, len)),
        2 => (0..keys).prop_map(Op::Delete),
        1 => (0..keys).prop_map(Op::Get),
        1 => (0..keys, 0..keys).prop_map(|(a, b)| Op::Range(a, b)),
    ]
}

/// Shape of the keys and the starting contents of one run.
#[derive(Debug, Clone, Copy)]
struct Workload {
    /// Bytes appended to every key.
    pad: usize,
    /// Keys `0..prefill` are set before the operations run.
    prefill: u16,
}

const SHORT_KEYS: Workload = Workload { pad: 0, prefill: 0 };

fn padded_key(k: u16, pad: usize) -> Vec<u8> {
    let mut key = format!("k{k:05}").into_bytes();
    key.resize(key.len() + pad, b'.');
    key
}

fn key(k: u16) -> Vec<u8> {
    padded_key(k, 0)
}

fn value(k: u16, len: usize) -> Vec<u8> {
    (0..len).map(|i| (k as usize + i) as u8).collect()
}

fn run(options: Options, workload: Workload, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let dir = tempdir().unwrap();
    let db = Db::open_with_options(dir.path().join("model.db"), options).unwrap();
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    let key = |k: u16| padded_key(k, workload.pad);

    for k in 0..workload.prefill {
        let v = value(k, 16);
        db.set(&key(k), &v).unwrap();
        model.insert(key(k), v);
    }

    for op in ops {
        match op {
            Op::Set(k, len) => {
                let v = value(k, len);
                let is_new = db.set(&key(k), &v).unwrap();
                prop_assert_eq!(is_new, model.insert(key(k), v).is_none());
            }
            Op::Delete(k) => {
                let result = db.delete(&key(k));
                match model.remove(&key(k)) {
                    Some(_) => prop_assert!(result.is_ok()),
                    None => prop_assert!(matches!(result, Err(Error::RecordNotFound))),
                }
                prop_assert!(db.verify().is_ok(), "{:?}", db.verify());
            }
            Op::Get(k) => match model.get(&key(k)) {
                Some(v) => prop_assert_eq!(&db.get(&key(k)).unwrap(), v),
                None => prop_assert!(matches!(db.get(&key(k)), Err(Error::RecordNotFound))),
            },
            Op::Range(a, b) => {
                let (lo, hi) = (key(a), key(b));
                let got = db.range(&lo, &hi).unwrap();
                let expected: Vec<_> = if lo <= hi {
                    model
                        .range(lo..=hi)
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                } else {
                    Vec::new()
                };
                prop_assert_eq!(got, expected);
            }
        }
    }

    prop_assert!(db.verify().is_ok());
    prop_assert_eq!(db.count().unwrap(), model.len());
    let all = db.range(b"", b"").unwrap();
    let expected: Vec<_> = model.into_iter().collect();
    prop_assert_eq!(all, expected);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_matches_btreemap(ops in prop::collection::vec(op_strategy(300, 400), 1..1500)) {
        run(Options::default(), SHORT_KEYS, ops)?;
    }

    #[test]
    fn prop_matches_btreemap_small_fanout(ops in prop::collection::vec(op_strategy(120, 400), 1..800)) {
        run(Options::default().with_dir_fanout(2), SHORT_KEYS, ops)?;
    }

    #[test]
    fn prop_matches_btreemap_deep_tree(ops in prop::collection::vec(op_strategy(200, 64), 1..800)) {
        run(Options::default(), Workload { pad: 340, prefill: 200 }, ops)?;
    }

    #[test]
    fn prop_reopen_keeps_contents(
        entries in prop::collection::btree_map(0u16..2000, 0usize..200, 0..600)
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        {
            let db = Db::open(&path).unwrap();
            for (&k, &len) in &entries {
                db.set(&key(k), &value(k, len)).unwrap();
            }
            db.flush().unwrap();
        }

        let db = Db::open(&path).unwrap();
        prop_assert!(db.verify().is_ok());
        let all = db.range(b"", b"").unwrap();
        let expected: Vec<_> = entries.iter().map(|(&k, &len)| (key(k), value(k, len))).collect();
        prop_assert_eq!(all, expected);
    }
}
