//! File-backed index of memory records and their embeddings.
//!
//! Layout under the index root:
//!
//! ```text
//! <root>/
//! ├── index.json              master: {entries, version, provider, last_updated}
//! ├── 2026-10-15.json         daily shard: {entries}
//! ├── embeddings/<id>.json    one vector per record: {id, embedding}
//! ├── topics/                 reserved
//! └── .lock                   flock held by writers
//! ```
//!
//! Vectors live apart from records so listing the index never has to read
//! the numeric payloads.
//!
//! Scaling limit: every append reads and rewrites the whole master index
//! and the whole day's shard. That is fine for hundreds to low thousands of
//! records and is the first thing to replace beyond that.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local, NaiveDate};
use opentelemetry::KeyValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{MemoryRecord, RecordId, StoredVector};
use crate::telemetry::metrics;

const MASTER_FILE: &str = "index.json";
const VECTOR_DIR: &str = "embeddings";
const TOPIC_DIR: &str = "topics";
const LOCK_FILE: &str = ".lock";

pub const INDEX_VERSION: &str = "2.0";
pub const INDEX_PROVIDER: &str = "gemini";

/// The cumulative master collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterIndex {
    #[serde(default)]
    pub entries: Vec<MemoryRecord>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl Default for MasterIndex {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            version: default_version(),
            provider: default_provider(),
            last_updated: None,
        }
    }
}

fn default_version() -> String {
    INDEX_VERSION.to_string()
}

fn default_provider() -> String {
    INDEX_PROVIDER.to_string()
}

/// Records created on one calendar day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyShard {
    #[serde(default)]
    pub entries: Vec<MemoryRecord>,
}

/// Storage backend. Owns the on-disk layout under one root directory.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn master_path(&self) -> PathBuf {
        self.root.join(MASTER_FILE)
    }

    pub fn shard_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    pub fn vector_path(&self, id: &RecordId) -> PathBuf {
        self.root.join(VECTOR_DIR).join(format!("{id}.json"))
    }

    /// Create the root, `embeddings/` and `topics/` if missing. Idempotent.
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.root.join(VECTOR_DIR))?;
        fs::create_dir_all(self.root.join(TOPIC_DIR))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Persist a record and its vector. Returns the record's id.
    ///
    /// Writes the master index, then the vector, then the day's shard, each
    /// as a full atomic rewrite. A failure part-way leaves the earlier files
    /// written; nothing is rolled back. The whole sequence runs under an
    /// exclusive lock on `.lock` so concurrent writers serialize.
    pub fn append(&self, record: &MemoryRecord, vector: &[f64]) -> Result<RecordId> {
        let start = Instant::now();
        self.ensure_layout()?;

        let lock_file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.root.join(LOCK_FILE))?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock.write()?;

        let master_path = self.master_path();
        let mut master: MasterIndex = read_json(&master_path)?.unwrap_or_default();
        if master.entries.iter().any(|e| e.id == record.id) {
            return Err(Error::DuplicateId(record.id.to_string()));
        }
        master.entries.push(record.clone());
        master.last_updated = Some(Local::now().to_rfc3339());
        write_json_atomic(&master_path, &master)?;

        let stored = StoredVector {
            id: record.id.clone(),
            embedding: vector.to_vec(),
        };
        write_json_atomic(&self.vector_path(&record.id), &stored)?;

        let shard_path = self.shard_path(shard_date(&record.timestamp));
        let mut shard: DailyShard = read_json(&shard_path)?.unwrap_or_default();
        shard.entries.push(record.clone());
        write_json_atomic(&shard_path, &shard)?;

        info!(
            id = %record.id,
            entries = master.entries.len(),
            dims = vector.len(),
            "memory appended"
        );
        record_operation("append", start);
        Ok(record.id.clone())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every record in the master index, in insertion order.
    pub fn load_all(&self) -> Result<Vec<MemoryRecord>> {
        let start = Instant::now();
        let master: Option<MasterIndex> = read_json(&self.master_path())?;
        record_operation("load_all", start);
        Ok(master.map(|m| m.entries).unwrap_or_default())
    }

    /// The master index with its metadata, if one exists yet.
    pub fn load_master(&self) -> Result<Option<MasterIndex>> {
        read_json(&self.master_path())
    }

    /// The last `n` records appended, oldest first.
    pub fn recent(&self, n: usize) -> Result<Vec<MemoryRecord>> {
        let mut entries = self.load_all()?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.split_off(skip))
    }

    /// Records in one day's shard.
    pub fn load_shard(&self, date: NaiveDate) -> Result<Vec<MemoryRecord>> {
        let shard: Option<DailyShard> = read_json(&self.shard_path(date))?;
        Ok(shard.map(|s| s.entries).unwrap_or_default())
    }

    pub fn load_vector(&self, id: &RecordId) -> Result<Option<Vec<f64>>> {
        let stored: Option<StoredVector> = read_json(&self.vector_path(id))?;
        Ok(stored.map(|s| s.embedding))
    }

    /// Every stored vector keyed by record id.
    ///
    /// A missing `embeddings/` directory is an empty index, not an error.
    pub fn load_all_vectors(&self) -> Result<BTreeMap<RecordId, Vec<f64>>> {
        let start = Instant::now();
        let dir = self.root.join(VECTOR_DIR);
        let mut vectors = BTreeMap::new();
        if !dir.is_dir() {
            return Ok(vectors);
        }

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let stored: StoredVector = match read_json(&path)? {
                Some(stored) => stored,
                None => continue,
            };
            if vectors.insert(stored.id.clone(), stored.embedding).is_some() {
                warn!(id = %stored.id, path = %path.display(), "duplicate vector id; keeping last");
            }
        }

        debug!(count = vectors.len(), "vectors loaded");
        record_operation("load_all_vectors", start);
        Ok(vectors)
    }
}

/// Read and decode a JSON file; `None` if it does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Write JSON via temp file + rename so readers never see a torn file.
fn write_json_atomic<T: Serialize>(target: &Path, value: &T) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| Error::Other(format!("no parent directory for {}", target.display())))?;

    let json = serde_json::to_vec_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| Error::Storage(e.error))?;
    Ok(())
}

fn record_operation(operation: &'static str, start: Instant) {
    let attrs = [KeyValue::new("operation", operation)];
    metrics::memory_operations().add(1, &attrs);
    metrics::operation_duration_ms().record(start.elapsed().as_secs_f64() * 1000.0, &attrs);
}

/// The calendar day (local time) whose shard holds a record.
pub fn shard_date(timestamp: &DateTime<Local>) -> NaiveDate {
    timestamp.date_naive()
}
