//! Turn a raw analysis response into a [`MemoryRecord`].
//!
//! The analysis model is asked for a JSON object, but what comes back is
//! only sometimes clean JSON. It may be wrapped in a markdown fence, buried
//! in prose, or not JSON at all. Parsing therefore runs an ordered list of
//! strategies and stops at the first one that yields an [`Analysis`]:
//!
//! 1. [`ParseStage::Fenced`]: strip an optional ```` ```json ```` / ```` ``` ````
//!    fence and parse the whole payload.
//! 2. [`ParseStage::FlatObject`]: parse the first brace-free object that
//!    contains a `"summary"` key.
//! 3. [`ParseStage::SummaryField`]: pull out just the `"summary"` string.
//! 4. [`ParseStage::RawPrefix`]: use the first 300 characters verbatim.
//!
//! The last stage cannot fail, so building a record never errors. Anything
//! past stage 1 is logged and counted so format drift upstream is visible.

use std::sync::LazyLock;

use chrono::{DateTime, Local};
use opentelemetry::KeyValue;
use regex::Regex;
use tracing::{debug, warn};

use crate::model::{Analysis, MemoryRecord, RecordId};
use crate::telemetry::metrics;

/// Characters of raw text kept when nothing structured can be recovered.
pub const RAW_SUMMARY_CHARS: usize = 300;

/// Characters of the raw response included in degradation logs.
const PREVIEW_CHARS: usize = 500;

/// Tokens per whitespace-separated word. A heuristic, not a tokenizer; the
/// displayed compression ratio depends on this exact factor.
const TOKENS_PER_WORD: f64 = 1.3;

static FLAT_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^{}]*"summary"[^{}]*\}"#).expect("flat object pattern is valid")
});

static SUMMARY_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""summary":\s*"([^"]+)""#).expect("summary field pattern is valid")
});

/// Which parsing strategy produced the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Fenced,
    FlatObject,
    SummaryField,
    RawPrefix,
}

impl ParseStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ParseStage::Fenced => "fenced",
            ParseStage::FlatObject => "flat_object",
            ParseStage::SummaryField => "summary_field",
            ParseStage::RawPrefix => "raw_prefix",
        }
    }

    /// Whether this stage lost information relative to a clean parse.
    pub fn is_degraded(self) -> bool {
        self != ParseStage::Fenced
    }
}

impl std::fmt::Display for ParseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running the strategy chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub analysis: Analysis,
    pub stage: ParseStage,
}

type Strategy = fn(&str) -> Option<Analysis>;

const STRATEGIES: [(ParseStage, Strategy); 3] = [
    (ParseStage::Fenced, parse_fenced),
    (ParseStage::FlatObject, parse_flat_object),
    (ParseStage::SummaryField, parse_summary_field),
];

/// Run the strategy chain over a raw analysis response.
pub fn parse_analysis(raw: &str) -> ParseOutcome {
    let outcome = STRATEGIES
        .iter()
        .find_map(|(stage, strategy)| {
            strategy(raw).map(|analysis| ParseOutcome {
                analysis,
                stage: *stage,
            })
        })
        .unwrap_or_else(|| ParseOutcome {
            analysis: raw_prefix(raw),
            stage: ParseStage::RawPrefix,
        });

    if outcome.stage.is_degraded() {
        warn!(
            stage = %outcome.stage,
            preview = %preview(raw),
            "analysis response was not clean JSON; fell back"
        );
        metrics::parse_fallbacks().add(1, &[KeyValue::new("stage", outcome.stage.as_str())]);
    } else {
        debug!("analysis response parsed cleanly");
    }

    outcome
}

fn parse_fenced(raw: &str) -> Option<Analysis> {
    serde_json::from_str(strip_fence(raw).trim()).ok()
}

fn parse_flat_object(raw: &str) -> Option<Analysis> {
    let found = FLAT_OBJECT.find(raw)?;
    serde_json::from_str(found.as_str()).ok()
}

fn parse_summary_field(raw: &str) -> Option<Analysis> {
    let caps = SUMMARY_FIELD.captures(raw)?;
    Some(Analysis::summary_only(&caps[1]))
}

fn raw_prefix(raw: &str) -> Analysis {
    Analysis::summary_only(raw.chars().take(RAW_SUMMARY_CHARS).collect::<String>())
}

/// The text inside a ```` ```json ```` fence, else inside the first generic
/// ```` ``` ```` pair, else the input unchanged.
fn strip_fence(raw: &str) -> &str {
    const LABELED: &str = "```json";
    const GENERIC: &str = "```";

    let after_open = if let Some(pos) = raw.find(LABELED) {
        &raw[pos + LABELED.len()..]
    } else if let Some(pos) = raw.find(GENERIC) {
        &raw[pos + GENERIC.len()..]
    } else {
        return raw;
    };

    match after_open.find(GENERIC) {
        Some(end) => &after_open[..end],
        None => after_open,
    }
}

fn preview(raw: &str) -> String {
    raw.chars().take(PREVIEW_CHARS).collect()
}

// ---------------------------------------------------------------------------
// Token heuristics
// ---------------------------------------------------------------------------

/// Unrounded token estimate: whitespace words × 1.3.
pub fn token_estimate(text: &str) -> f64 {
    text.split_whitespace().count() as f64 * TOKENS_PER_WORD
}

/// Approximate token count: [`token_estimate`], truncated.
pub fn estimate_tokens(text: &str) -> u64 {
    token_estimate(text) as u64
}

/// `"<original / max(compressed, 1)>:1"` over the unrounded estimates, so a
/// one-word summary (1.3 tokens) divides by 1.3 rather than by 1.
pub fn compression_ratio(original: f64, compressed: f64) -> String {
    format!("{}:1", (original / compressed.max(1.0)) as u64)
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles records, stamping provenance that is fixed for a process.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    model: String,
    source_session: String,
}

impl RecordBuilder {
    pub fn new(model: impl Into<String>, source_session: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            source_session: source_session.into(),
        }
    }

    /// Build a record from a raw analysis response and the text it analyzed.
    pub fn build(&self, raw_response: &str, original_text: &str) -> MemoryRecord {
        self.build_at(raw_response, original_text, Local::now())
    }

    /// Same as [`build`](Self::build) with an explicit creation instant.
    pub fn build_at(
        &self,
        raw_response: &str,
        original_text: &str,
        at: DateTime<Local>,
    ) -> MemoryRecord {
        let ParseOutcome { analysis, .. } = parse_analysis(raw_response);
        self.assemble(analysis, original_text, at)
    }

    /// Wrap an already parsed analysis into a record.
    pub fn assemble(
        &self,
        analysis: Analysis,
        original_text: &str,
        at: DateTime<Local>,
    ) -> MemoryRecord {
        let original = token_estimate(original_text);
        let compressed = token_estimate(&analysis.summary);

        MemoryRecord {
            id: RecordId::generate(at),
            timestamp: at,
            summary: analysis.summary,
            keywords: analysis.keywords,
            topics: analysis.topics,
            decisions: analysis.decisions,
            action_items: analysis.action_items,
            entities: analysis.entities,
            importance: analysis.importance,
            tokens_original: original as u64,
            tokens_compressed: compressed as u64,
            compression_ratio: compression_ratio(original, compressed),
            source_session: self.source_session.clone(),
            model: self.model.clone(),
        }
    }
}
