//! Metric instrument factories for mnemo-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("mnemo-rs")
}

/// Counter: index operations (append, load_all, load_all_vectors, search).
/// Labels: `operation`.
pub fn memory_operations() -> Counter<u64> {
    meter()
        .u64_counter("mnemo.memory.operations")
        .with_description("Number of memory index operations")
        .build()
}

/// Counter: analysis responses that needed a fallback parser.
/// Labels: `stage` ("flat_object" | "summary_field" | "raw_prefix").
pub fn parse_fallbacks() -> Counter<u64> {
    meter()
        .u64_counter("mnemo.parse.fallbacks")
        .with_description("Analysis responses recovered by a fallback parser")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("mnemo.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: estimated LLM token usage.
/// Labels: `model`, `provider`, `direction` ("input" | "output").
pub fn llm_tokens() -> Counter<u64> {
    meter()
        .u64_counter("mnemo.llm.tokens")
        .with_description("Estimated LLM token usage")
        .build()
}
