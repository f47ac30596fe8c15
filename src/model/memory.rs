//! Memory record types.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Record identity
// ---------------------------------------------------------------------------

/// Newtype for record IDs: `ctx-YYYYMMDD-xxxxxx`.
///
/// The date part is the local creation date; the suffix is six hex chars of
/// a random UUID. Used as the join key across index, shards and vectors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate(at: DateTime<Local>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("ctx-{}-{}", at.format("%Y%m%d"), &suffix[..6]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Memory record
// ---------------------------------------------------------------------------

/// A compressed memory, as stored in the master index and daily shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: RecordId,

    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Local>,

    /// Two or three sentences on what was accomplished.
    pub summary: String,

    /// Five to ten specific terms.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// One to three high-level categories.
    #[serde(default)]
    pub topics: Vec<String>,

    #[serde(default)]
    pub decisions: Vec<String>,

    #[serde(default)]
    pub action_items: Vec<String>,

    #[serde(default)]
    pub entities: Entities,

    #[serde(default)]
    pub importance: Importance,

    /// Heuristic token estimate of the input (see `memory::builder`).
    #[serde(default)]
    pub tokens_original: u64,

    /// Heuristic token estimate of the summary.
    #[serde(default)]
    pub tokens_compressed: u64,

    /// Display string, e.g. `"10:1"`.
    #[serde(default)]
    pub compression_ratio: String,

    #[serde(default)]
    pub source_session: String,

    /// Analysis model that produced the summary.
    #[serde(default)]
    pub model: String,
}

/// Named entities mentioned in the conversation.
///
/// All three keys are always written, even when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default, deserialize_with = "or_default")]
    pub people: Vec<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub systems: Vec<String>,
    #[serde(default, deserialize_with = "or_default")]
    pub dates: Vec<String>,
}

/// How much a memory matters.
///
/// Reads are lenient: case-insensitive, and anything unrecognized becomes
/// `Medium` so one odd model answer never makes the whole index unreadable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Importance {
    Low,
    #[default]
    Medium,
    High,
}

impl From<String> for Importance {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Importance::Low,
            "high" => Importance::High,
            _ => Importance::Medium,
        }
    }
}

impl std::fmt::Display for Importance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Importance::Low => "low",
            Importance::Medium => "medium",
            Importance::High => "high",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Analysis payload
// ---------------------------------------------------------------------------

/// The structured object the analysis model is asked to return.
///
/// Every field is optional on the wire. Absent, null or mistyped fields take
/// their empty value without discarding the rest of the object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Analysis {
    #[serde(deserialize_with = "or_default")]
    pub summary: String,
    #[serde(deserialize_with = "or_default")]
    pub keywords: Vec<String>,
    #[serde(deserialize_with = "or_default")]
    pub topics: Vec<String>,
    #[serde(deserialize_with = "or_default")]
    pub decisions: Vec<String>,
    #[serde(deserialize_with = "or_default")]
    pub action_items: Vec<String>,
    #[serde(deserialize_with = "or_default")]
    pub entities: Entities,
    #[serde(deserialize_with = "or_default")]
    pub importance: Importance,
}

impl Analysis {
    /// Minimal analysis used when only a summary could be recovered.
    pub fn summary_only(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            topics: vec!["general".to_string()],
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Vectors and search results
// ---------------------------------------------------------------------------

/// On-disk form of one embedding: `embeddings/<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVector {
    pub id: RecordId,
    #[serde(default)]
    pub embedding: Vec<f64>,
}

/// A record returned by search, with its similarity to the query.
///
/// `similarity` is transient; it is never written back to the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: MemoryRecord,
    pub similarity: f64,
}

/// Deserialize a field, falling back to its default when the value is null
/// or has the wrong shape.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Accept RFC 3339, or the naive `YYYY-MM-DDTHH:MM:SS[.f]` form older
/// indexes were written with (interpreted as local time).
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: {raw}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn record_id_encodes_creation_date() {
        let at = Local.with_ymd_and_hms(2026, 3, 9, 14, 0, 0).unwrap();
        let id = RecordId::generate(at);
        assert!(id.as_str().starts_with("ctx-20260309-"), "got {id}");
        let suffix = &id.as_str()["ctx-20260309-".len()..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn importance_parses_leniently() {
        let parsed: Importance = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(parsed, Importance::High);
        let parsed: Importance = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(parsed, Importance::Medium);
        assert_eq!(serde_json::to_string(&Importance::Low).unwrap(), "\"low\"");
    }

    #[test]
    fn naive_timestamps_are_read_as_local_time() {
        let ts = parse_timestamp("2025-11-02T08:30:15.123456").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2025, 11, 2));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (8, 30, 15));
    }

    #[test]
    fn legacy_record_with_empty_entities_loads() {
        let raw = r#"{
            "id": "ctx-20251102-a1b2c3",
            "timestamp": "2025-11-02T08:30:15.123456",
            "summary": "Set up the docker stack.",
            "keywords": ["docker"],
            "entities": {},
            "importance": "medium",
            "tokens_original": 130,
            "tokens_compressed": 13,
            "compression_ratio": "10:1",
            "source_session": "main",
            "model": "gemini-2.0-flash"
        }"#;
        let record: MemoryRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.entities, Entities::default());
        assert!(record.topics.is_empty());

        let written = serde_json::to_value(&record).unwrap();
        assert_eq!(
            written["entities"],
            serde_json::json!({"people": [], "systems": [], "dates": []})
        );
    }
}
