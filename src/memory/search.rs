//! Brute-force similarity search over the index.
//!
//! Scores every stored vector against the query. O(n) per query, which is
//! the intended trade-off for a single-user index of at most a few thousand
//! memories.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::debug;

use crate::error::Result;
use crate::memory::store::IndexStore;
use crate::memory::vector::{cosine_similarity, round_score};
use crate::model::{RecordId, ScoredRecord};
use crate::telemetry::metrics;

pub const DEFAULT_TOP_K: usize = 5;

/// Ranks stored records by cosine similarity to a query vector.
pub struct SearchEngine<'a> {
    store: &'a IndexStore,
}

impl<'a> SearchEngine<'a> {
    pub fn new(store: &'a IndexStore) -> Self {
        Self { store }
    }

    /// The `k` records most similar to `query`, best first.
    ///
    /// Equal scores are ordered by ascending record id. An index with no
    /// vectors yields an empty result.
    pub fn rank(&self, query: &[f64], k: usize) -> Result<Vec<ScoredRecord>> {
        let start = Instant::now();

        let vectors = self.store.load_all_vectors()?;
        if vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        // BTreeMap iteration is id-ordered and the sort is stable, so ties
        // keep ascending id order.
        let mut scores: Vec<(RecordId, f64)> = vectors
            .into_iter()
            .map(|(id, vector)| {
                let score = cosine_similarity(query, &vector);
                (id, score)
            })
            .collect();
        scores.sort_by(|a, b| by_score_desc(a.1, b.1));
        scores.truncate(k);

        let top: HashMap<RecordId, f64> = scores.into_iter().collect();

        let mut results: Vec<ScoredRecord> = self
            .store
            .load_all()?
            .into_iter()
            .filter_map(|record| {
                top.get(&record.id).map(|score| ScoredRecord {
                    similarity: round_score(*score),
                    record,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            by_score_desc(a.similarity, b.similarity).then_with(|| a.record.id.cmp(&b.record.id))
        });

        debug!(
            candidates = top.len(),
            returned = results.len(),
            "similarity search complete"
        );
        let attrs = [KeyValue::new("operation", "search")];
        metrics::memory_operations().add(1, &attrs);
        metrics::operation_duration_ms().record(start.elapsed().as_secs_f64() * 1000.0, &attrs);

        Ok(results)
    }
}

/// Descending by score. `total_cmp` keeps the order total when a score is NaN.
fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}
