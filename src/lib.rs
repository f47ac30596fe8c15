//! # mnemo-rs
//!
//! Compresses conversational text into structured memory records and
//! recalls them by semantic similarity.
//!
//! Provides a file-backed memory index (JSON master index, daily shards,
//! per-record embeddings), a tolerant parser for LLM analysis output,
//! brute-force cosine search, Gemini access via rig-core, and
//! OpenTelemetry observability.

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod model;
pub mod telemetry;
