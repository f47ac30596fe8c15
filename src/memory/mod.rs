//! Memory engine: record building, similarity, file index, search, pipeline.

pub mod builder;
pub mod pipeline;
pub mod search;
pub mod store;
pub mod vector;

pub use builder::{ParseOutcome, ParseStage, RecordBuilder, parse_analysis};
pub use pipeline::CompressionPipeline;
pub use search::{DEFAULT_TOP_K, SearchEngine};
pub use store::IndexStore;
pub use vector::cosine_similarity;
