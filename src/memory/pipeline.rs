//! Compression and recall orchestration.
//!
//! `compress`: text → analysis call → [`RecordBuilder`] → embedding call →
//! [`IndexStore::append`]. `search`: query → embedding call →
//! [`SearchEngine::rank`].

use tracing::{Instrument, info, info_span};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{Analyzer, Embedder, analysis_prompt, truncate_input};
use crate::memory::builder::{RecordBuilder, parse_analysis};
use crate::memory::search::SearchEngine;
use crate::memory::store::IndexStore;
use crate::model::{MemoryRecord, ScoredRecord};

/// Wires the external collaborators to the record builder and the index.
pub struct CompressionPipeline<'a, A, E> {
    analyzer: &'a A,
    embedder: &'a E,
    store: &'a IndexStore,
    builder: RecordBuilder,
    max_input_chars: usize,
}

impl<'a, A: Analyzer, E: Embedder> CompressionPipeline<'a, A, E> {
    pub fn new(
        config: &Config,
        analyzer: &'a A,
        embedder: &'a E,
        store: &'a IndexStore,
    ) -> Self {
        Self {
            analyzer,
            embedder,
            store,
            builder: RecordBuilder::new(&config.analysis_model, &config.source_session),
            max_input_chars: config.max_input_chars,
        }
    }

    /// Override the input truncation limit.
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    /// Compress `text` into a new memory record and persist it.
    ///
    /// # Errors
    /// [`Error::EmptyInput`] for blank text (checked before any upstream
    /// call); upstream, timeout and storage errors otherwise. A malformed
    /// analysis response is not an error.
    pub async fn compress(&self, text: &str) -> Result<MemoryRecord> {
        if text.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        let span = info_span!("memory.compress", input_chars = text.chars().count());
        async {
            let conversation = truncate_input(text, self.max_input_chars);
            let raw = self
                .analyzer
                .analyze(&analysis_prompt(&conversation))
                .await?;

            let outcome = parse_analysis(&raw);
            let record = self.builder.assemble(
                outcome.analysis,
                &conversation,
                chrono::Local::now(),
            );

            let vector = self.embedder.embed(&embedding_text(&record)).await?;
            self.store.append(&record, &vector)?;

            info!(
                id = %record.id,
                parse_stage = %outcome.stage,
                ratio = %record.compression_ratio,
                "conversation compressed"
            );
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Embed `query` and return the `k` most similar stored records.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredRecord>> {
        let vector = self.embedder.embed(query).await?;
        SearchEngine::new(self.store).rank(&vector, k)
    }
}

/// Text embedded for a record: the summary followed by its keywords.
pub fn embedding_text(record: &MemoryRecord) -> String {
    format!("{} {}", record.summary, record.keywords.join(" "))
}
