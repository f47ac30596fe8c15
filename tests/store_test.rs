//! Index store persistence: master index, daily shards, vector files.

use chrono::{Local, NaiveDate, TimeZone};
use mnemo_rs::error::Error;
use mnemo_rs::memory::builder::RecordBuilder;
use mnemo_rs::memory::store::{INDEX_PROVIDER, INDEX_VERSION, IndexStore};
use mnemo_rs::model::{Importance, MemoryRecord, RecordId};
use tempfile::TempDir;

fn record(summary: &str, day: u32) -> MemoryRecord {
    let at = Local.with_ymd_and_hms(2026, 10, day, 12, 0, 0).unwrap();
    let raw = serde_json::json!({
        "summary": summary,
        "keywords": ["alpha", "beta"],
        "topics": ["testing"],
        "decisions": ["ship it"],
        "action_items": [],
        "entities": {"people": ["Ana"], "systems": ["redis"], "dates": []},
        "importance": "high"
    })
    .to_string();
    RecordBuilder::new("test-model", "main").build_at(&raw, "some original text here", at)
}

fn temp_store() -> (TempDir, IndexStore) {
    let dir = TempDir::new().unwrap();
    let store = IndexStore::new(dir.path().join("index"));
    (dir, store)
}

#[test]
fn ensure_layout_is_idempotent() {
    let (_dir, store) = temp_store();
    store.ensure_layout().unwrap();
    store.ensure_layout().unwrap();
    assert!(store.root().join("embeddings").is_dir());
    assert!(store.root().join("topics").is_dir());
}

#[test]
fn empty_store_reads_as_empty() {
    let (_dir, store) = temp_store();
    assert!(store.load_all().unwrap().is_empty());
    assert!(store.load_all_vectors().unwrap().is_empty());
    assert!(store.recent(10).unwrap().is_empty());
    assert!(store.load_master().unwrap().is_none());
    assert_eq!(store.load_vector(&RecordId::from("ctx-x")).unwrap(), None);
}

#[test]
fn append_then_load_preserves_fields() {
    let (_dir, store) = temp_store();
    let rec = record("Set up the staging cluster.", 14);

    let id = store.append(&rec, &[0.1, 0.2, 0.3]).unwrap();
    assert_eq!(id, rec.id);

    let all = store.load_all().unwrap();
    assert_eq!(all, vec![rec.clone()]);
    assert_eq!(all[0].importance, Importance::High);
    assert_eq!(all[0].entities.systems, ["redis"]);

    assert_eq!(store.load_vector(&rec.id).unwrap(), Some(vec![0.1, 0.2, 0.3]));
}

#[test]
fn appending_n_times_yields_n_entries_in_order() {
    let (_dir, store) = temp_store();
    let records: Vec<_> = (0..4).map(|i| record(&format!("memory {i}"), 15)).collect();
    for r in &records {
        store.append(r, &[1.0, 0.0]).unwrap();
    }

    let all = store.load_all().unwrap();
    assert_eq!(all.len(), 4);
    let summaries: Vec<_> = all.iter().map(|r| r.summary.as_str()).collect();
    assert_eq!(summaries, ["memory 0", "memory 1", "memory 2", "memory 3"]);
    assert_eq!(store.load_all_vectors().unwrap().len(), 4);
}

#[test]
fn concurrent_appends_are_not_lost() {
    const WRITERS: usize = 8;
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("index");
    let records: Vec<_> = (0..WRITERS)
        .map(|i| record(&format!("writer {i}"), 16))
        .collect();

    // Separate store handles, as separate processes would have.
    std::thread::scope(|scope| {
        for r in &records {
            let root = root.clone();
            scope.spawn(move || {
                IndexStore::new(root).append(r, &[1.0, 0.5]).unwrap();
            });
        }
    });

    let store = IndexStore::new(&root);
    let mut ids: Vec<_> = store.load_all().unwrap().into_iter().map(|r| r.id).collect();
    ids.sort();
    let mut expected: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
    expected.sort();
    assert_eq!(ids, expected);

    let day = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    assert_eq!(store.load_shard(day).unwrap().len(), WRITERS);
    assert_eq!(store.load_all_vectors().unwrap().len(), WRITERS);
}

#[test]
fn daily_shard_mirrors_master_by_day() {
    let (_dir, store) = temp_store();
    let a = record("first on the 14th", 14);
    let b = record("second on the 14th", 14);
    let c = record("only one on the 15th", 15);
    for r in [&a, &b, &c] {
        store.append(r, &[1.0]).unwrap();
    }

    let day14 = NaiveDate::from_ymd_opt(2026, 10, 14).unwrap();
    let day15 = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();

    assert_eq!(store.load_shard(day14).unwrap(), vec![a, b]);
    assert_eq!(store.load_shard(day15).unwrap(), vec![c]);
    assert!(store.shard_path(day14).ends_with("2026-10-14.json"));
}

#[test]
fn master_carries_version_and_provider() {
    let (_dir, store) = temp_store();
    store.append(&record("x", 14), &[1.0]).unwrap();

    let master = store.load_master().unwrap().unwrap();
    assert_eq!(master.version, INDEX_VERSION);
    assert_eq!(master.provider, INDEX_PROVIDER);
    assert!(master.last_updated.is_some());

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.master_path()).unwrap()).unwrap();
    assert!(raw["entries"].is_array());
    assert_eq!(raw["entries"][0]["summary"], "x");
    assert!(raw["entries"][0].get("similarity").is_none());
}

#[test]
fn duplicate_id_is_rejected_without_changes() {
    let (_dir, store) = temp_store();
    let rec = record("original", 14);
    store.append(&rec, &[1.0, 0.0]).unwrap();

    let mut dup = record("impostor", 14);
    dup.id = rec.id.clone();
    let err = store.append(&dup, &[0.0, 1.0]).unwrap_err();
    assert!(matches!(err, Error::DuplicateId(ref id) if id == rec.id.as_str()));

    let all = store.load_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].summary, "original");
    assert_eq!(store.load_vector(&rec.id).unwrap(), Some(vec![1.0, 0.0]));
}

#[test]
fn recent_returns_tail_oldest_first() {
    let (_dir, store) = temp_store();
    for i in 0..5 {
        store.append(&record(&format!("m{i}"), 15), &[1.0]).unwrap();
    }
    let recent: Vec<_> = store
        .recent(2)
        .unwrap()
        .into_iter()
        .map(|r| r.summary)
        .collect();
    assert_eq!(recent, ["m3", "m4"]);
    assert_eq!(store.recent(50).unwrap().len(), 5);
}

#[test]
fn reads_index_written_by_older_tooling() {
    let (_dir, store) = temp_store();
    store.ensure_layout().unwrap();
    std::fs::write(
        store.master_path(),
        r#"{
  "entries": [{
    "id": "ctx-20250101-abcdef",
    "timestamp": "2025-01-01T10:00:00.000001",
    "summary": "Legacy entry.",
    "keywords": [],
    "topics": ["general"],
    "decisions": [],
    "action_items": [],
    "entities": {},
    "importance": "Medium",
    "tokens_original": 13,
    "tokens_compressed": 2,
    "compression_ratio": "6:1",
    "source_session": "main",
    "model": "gemini-2.0-flash"
  }],
  "version": "2.0",
  "provider": "gemini",
  "last_updated": "2025-01-01T10:00:00.000002"
}"#,
    )
    .unwrap();
    std::fs::write(
        store.root().join("embeddings").join("ctx-20250101-abcdef.json"),
        r#"{"id": "ctx-20250101-abcdef", "embedding": [0.5, 0.5]}"#,
    )
    .unwrap();

    let all = store.load_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].summary, "Legacy entry.");
    assert_eq!(all[0].importance, Importance::Medium);

    let vectors = store.load_all_vectors().unwrap();
    assert_eq!(vectors[&RecordId::from("ctx-20250101-abcdef")], vec![0.5, 0.5]);
}

#[test]
fn corrupt_master_surfaces_as_error() {
    let (_dir, store) = temp_store();
    store.ensure_layout().unwrap();
    std::fs::write(store.master_path(), "{ not json").unwrap();
    assert!(matches!(store.load_all(), Err(Error::Serialization(_))));
}
