//! Core data model.
//!
//! A memory record is the compressed, structured form of one piece of
//! conversational text. Records are written once and never mutated; the
//! index only ever grows.

pub mod memory;

pub use memory::{
    Analysis, Entities, Importance, MemoryRecord, RecordId, ScoredRecord, StoredVector,
};
