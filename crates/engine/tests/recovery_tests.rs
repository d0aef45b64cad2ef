//! Collection Recovery Tests
//!
//! Tests verifying that a collection survives close + log replay:
//! - Rows: same ids, same documents
//! - Indexes: replayed definitions, same query answers
//! - Counters: ids and auto() values are never reissued
//! - Damage: a torn tail is ignored, anything else fails the open

use serde_json::{json, Value};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use stratadoc_core::{Error, IndexOptions, IndexQuery, RangeQuery, RowId};
use stratadoc_durability::format::{decode_frame, FILE_HEADER_SIZE};
use stratadoc_durability::{DurabilityMode, LogConfig};
use stratadoc_engine::Collection;
use stratadoc_storage::ContainerKind;
use tempfile::TempDir;

fn log_path(dir: &TempDir) -> PathBuf {
    dir.path().join("people.log")
}

fn open(path: &Path) -> Collection {
    Collection::open("people", path, LogConfig::default(), ContainerKind::Btree).unwrap()
}

fn documents(c: &Collection) -> Vec<(u64, Value)> {
    let mut out = Vec::new();
    c.traverse(|row| {
        out.push((row.id().0, (*row.document().unwrap()).clone()));
        true
    });
    out
}

fn ids(c: &Collection, index: &str, query: &IndexQuery) -> Vec<u64> {
    c.find(index, query)
        .unwrap()
        .iter()
        .map(|r| r.id().0)
        .collect()
}

/// Test rows and index contents survive close and reopen
#[test]
fn test_close_reopen_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    let before = {
        let c = open(&path);
        c.create_index("by_email", IndexOptions::map("email").unique(true))
            .unwrap();
        c.create_index("by_age", IndexOptions::btree(["age"])).unwrap();
        c.create_index("bio", IndexOptions::fulltext("bio")).unwrap();

        for (i, age) in [30, 20, 40, 25].iter().enumerate() {
            c.insert(json!({
                "email": format!("u{}@x", i),
                "age": age,
                "bio": format!("likes rust number {}", i),
            }))
            .unwrap();
        }
        c.patch(RowId(2), &json!({"bio": "likes go"})).unwrap();
        c.remove(RowId(3)).unwrap();
        c.drop_index("bio").unwrap();
        c.create_index("bio2", IndexOptions::fulltext("bio")).unwrap();

        let docs = documents(&c);
        c.close().unwrap();
        docs
    };

    let c = open(&path);
    assert_eq!(documents(&c), before);
    assert_eq!(c.index_names(), vec!["bio2", "by_age", "by_email"]);
    assert_eq!(ids(&c, "by_email", &IndexQuery::value("u1@x")), vec![2]);
    assert!(ids(&c, "by_email", &IndexQuery::value("u2@x")).is_empty());
    assert_eq!(ids(&c, "by_age", &RangeQuery::new().into()), vec![2, 4, 1]);
    assert_eq!(ids(&c, "bio2", &IndexQuery::matching("likes rust")), vec![1, 4]);
    assert_eq!(ids(&c, "bio2", &IndexQuery::matching("go")), vec![2]);

    // Replayed unique index still enforces uniqueness
    let err = c.insert(json!({"email": "u0@x", "age": 1, "bio": ""})).unwrap_err();
    assert!(err.is_conflict());
}

/// Test a no-op patch writes no second record
#[test]
fn test_noop_patch_is_not_logged() {
    let dir = TempDir::new().unwrap();
    let c = open(&log_path(&dir));
    let row = c.insert(json!({"a": 1, "b": [1, 2]})).unwrap();

    assert!(c.patch(row.id(), &json!({"a": 2})).unwrap());
    c.sync().unwrap();
    let logged = c.stats().records_written;
    assert_eq!(logged, 2);

    assert!(!c.patch(row.id(), &json!({"a": 2})).unwrap());
    assert!(!c.patch(row.id(), &json!({"b": [1, 2], "gone": null})).unwrap());
    c.sync().unwrap();
    assert_eq!(c.stats().records_written, logged);
}

/// Test a patch that stores a null inside a replaced value replays exactly
#[test]
fn test_patch_with_nested_null_replays() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    {
        let c = open(&path);
        let row = c.insert(json!({"a": {"x": 1}})).unwrap();
        c.patch(row.id(), &json!({"a": [null, 1], "b": {"c": "d"}}))
            .unwrap();
        c.patch(row.id(), &json!({"b": {"c": null, "e": 5}}))
            .unwrap();
        c.close().unwrap();
    }
    let c = open(&path);
    let doc = c.get(RowId(1)).unwrap().document().unwrap();
    assert_eq!(*doc, json!({"a": [null, 1], "b": {"e": 5}}));
}

/// Test ids are not reissued after reopen
#[test]
fn test_ids_resume_above_log() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    {
        let c = open(&path);
        for _ in 0..5 {
            c.insert(json!({})).unwrap();
        }
        c.remove(RowId(5)).unwrap();
        c.close().unwrap();
    }
    let c = open(&path);
    assert_eq!(c.insert(json!({})).unwrap().id(), RowId(6));
}

/// Test defaults and the auto() counter survive reopen
#[test]
fn test_defaults_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    {
        let c = open(&path);
        c.set_defaults(json!({"n": "auto()", "id": "uuid()", "kind": "person"}))
            .unwrap();
        c.insert(json!({})).unwrap();
        c.insert(json!({})).unwrap();
        c.close().unwrap();
    }
    let c = open(&path);
    assert_eq!(c.defaults().len(), 3);
    let doc = c.insert(json!({})).unwrap().document().unwrap();
    assert_eq!(doc["n"], 3);
    assert_eq!(doc["kind"], "person");
    assert!(doc["id"].is_string());
}

/// Test explicit auto() values move the counter the same way live and on replay
#[test]
fn test_explicit_auto_value_replays_identically() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let live_next = {
        let c = open(&path);
        c.set_defaults(json!({"n": "auto()"})).unwrap();
        c.insert(json!({})).unwrap();
        c.insert(json!({"n": 99})).unwrap();
        let third = c.insert(json!({})).unwrap();
        assert_eq!(third.document().unwrap()["n"], 100);
        c.remove(third.id()).unwrap();
        c.close().unwrap();
        101
    };

    let c = open(&path);
    let doc = c.insert(json!({})).unwrap().document().unwrap();
    assert_eq!(doc["n"], live_next);
}

/// Test a patched auto() field does not move the counter through compaction
#[test]
fn test_compaction_restores_exact_auto_counter() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    {
        let c = open(&path);
        c.set_defaults(json!({"n": "auto()"})).unwrap();
        c.insert(json!({})).unwrap();
        c.insert(json!({})).unwrap();
        c.patch(RowId(1), &json!({"n": 500})).unwrap();
        c.compact().unwrap();
        c.close().unwrap();
    }
    let c = open(&path);
    assert_eq!(c.get(RowId(1)).unwrap().document().unwrap()["n"], 500);
    assert_eq!(c.insert(json!({})).unwrap().document().unwrap()["n"], 3);
}

/// Test compaction keeps ids, documents, indexes and counters
#[test]
fn test_compaction_preserves_state() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let before = {
        let c = open(&path);
        c.set_defaults(json!({"n": "auto()"})).unwrap();
        c.create_index("by_n", IndexOptions::btree(["-n"])).unwrap();
        for i in 0..20 {
            c.insert(json!({"i": i})).unwrap();
        }
        for id in 11..=20 {
            c.remove(RowId(id)).unwrap();
        }
        for id in 1..=10 {
            c.patch(RowId(id), &json!({"patched": true})).unwrap();
        }

        // counters + defaults + one index + ten rows
        assert_eq!(c.compact().unwrap(), 13);
        c.sync().unwrap();
        assert!(!dir.path().join("people.log.compact").exists());

        c.insert(json!({})).unwrap();
        let docs = documents(&c);
        c.close().unwrap();
        docs
    };

    assert_eq!(before.last().unwrap().0, 21);
    assert_eq!(before.last().unwrap().1["n"], 21);

    let c = open(&path);
    assert_eq!(documents(&c), before);
    assert_eq!(ids(&c, "by_n", &RangeQuery::new().into())[0], 21);
    let next = c.insert(json!({})).unwrap();
    assert_eq!(next.id(), RowId(22));
    assert_eq!(next.document().unwrap()["n"], 22);
}

/// Test removed ids stay retired across compaction
#[test]
fn test_compaction_keeps_id_watermark() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    {
        let c = open(&path);
        for _ in 0..3 {
            c.insert(json!({})).unwrap();
        }
        c.remove(RowId(3)).unwrap();
        c.remove(RowId(2)).unwrap();
        c.compact().unwrap();
        c.close().unwrap();
    }
    let c = open(&path);
    assert_eq!(c.len(), 1);
    assert_eq!(c.insert(json!({})).unwrap().id(), RowId(4));
}

/// Test a half-written final record is dropped and the log stays usable
#[test]
fn test_torn_tail_recovers() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    {
        let c = open(&path);
        for i in 0..4 {
            c.insert(json!({"i": i})).unwrap();
        }
        c.close().unwrap();
    }
    let len = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 3).unwrap();
    drop(file);

    {
        let c = open(&path);
        assert_eq!(c.len(), 3);
        assert_eq!(c.insert(json!({"i": "again"})).unwrap().id(), RowId(4));
        c.close().unwrap();
    }
    let c = open(&path);
    assert_eq!(c.len(), 4);
}

/// Test damage before the last record fails the open
#[test]
fn test_mid_file_corruption_fails_open() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    {
        let c = open(&path);
        for i in 0..4 {
            c.insert(json!({"i": i})).unwrap();
        }
        c.close().unwrap();
    }

    let mut bytes = fs::read(&path).unwrap();
    let first = decode_frame(&bytes[FILE_HEADER_SIZE..]).unwrap().consumed;
    let second_start = FILE_HEADER_SIZE + first;
    bytes[second_start + 20] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let err = Collection::open("people", &path, LogConfig::default(), ContainerKind::Btree)
        .unwrap_err();
    match err {
        Error::Corruption { record, offset, .. } => {
            assert_eq!(record, 1);
            assert_eq!(offset, second_start as u64);
        }
        other => panic!("expected corruption, got {:?}", other),
    }
}

/// Test Always mode survives without an explicit close
#[test]
fn test_always_mode_records_are_durable_on_drop() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let config = LogConfig::new().with_mode(DurabilityMode::Always);
    {
        let c = Collection::open("people", &path, config.clone(), ContainerKind::Keyed).unwrap();
        c.insert(json!({"a": 1})).unwrap();
        c.insert(json!({"a": 2})).unwrap();
    }
    let c = Collection::open("people", &path, config, ContainerKind::Keyed).unwrap();
    assert_eq!(c.len(), 2);
    assert_eq!(c.durability(), DurabilityMode::Always);
}

/// Test mutations after close fail and leave the log alone
#[test]
fn test_closed_collection_keeps_log_intact() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let c = open(&path);
    c.insert(json!({"a": 1})).unwrap();
    c.close().unwrap();
    assert!(matches!(c.insert(json!({"a": 2})), Err(Error::Closed)));
    assert!(matches!(c.sync(), Err(Error::Closed)));
    assert!(matches!(c.compact(), Err(Error::Closed)));

    let reopened = open(&path);
    assert_eq!(reopened.len(), 1);
}

mod replay_model {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Insert(i64),
        Remove(usize),
        Patch(usize, i64),
        Compact,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0i64..100).prop_map(Op::Insert),
            2 => any::<usize>().prop_map(Op::Remove),
            2 => (any::<usize>(), 0i64..100).prop_map(|(i, v)| Op::Patch(i, v)),
            1 => Just(Op::Compact),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Any mix of mutations and compactions reopens to the same rows
        /// and the same next id.
        #[test]
        fn reopen_matches_live_state(ops in proptest::collection::vec(op(), 1..40)) {
            let dir = TempDir::new().unwrap();
            let path = log_path(&dir);
            let (before, next) = {
                let c = open(&path);
                c.create_index("by_v", IndexOptions::btree(["v"])).unwrap();
                let mut live: Vec<RowId> = Vec::new();
                for op in &ops {
                    match *op {
                        Op::Insert(v) => live.push(c.insert(json!({"v": v})).unwrap().id()),
                        Op::Remove(i) if !live.is_empty() => {
                            let id = live.remove(i % live.len());
                            c.remove(id).unwrap();
                        }
                        Op::Patch(i, v) if !live.is_empty() => {
                            let id = live[i % live.len()];
                            c.patch(id, &json!({"v": v, "p": true})).unwrap();
                        }
                        Op::Compact => {
                            c.compact().unwrap();
                        }
                        _ => {}
                    }
                }
                let docs = documents(&c);
                let next = c.insert(json!({"v": 0})).unwrap().id();
                c.remove(next).unwrap();
                c.close().unwrap();
                (docs, next)
            };

            let c = open(&path);
            prop_assert_eq!(documents(&c), before.clone());
            let ordered = ids(&c, "by_v", &RangeQuery::new().into());
            prop_assert_eq!(ordered.len(), before.len());
            let after = c.insert(json!({"v": 1})).unwrap().id();
            prop_assert!(after > next);
        }
    }
}
