//! GenAI semantic convention span helpers for LLM operations.
//!
//! Field names follow the OpenTelemetry GenAI conventions
//! (`gen_ai.operation.name`, `gen_ai.request.model`, `gen_ai.provider.name`,
//! `gen_ai.usage.*`). Token counts recorded here are word-count estimates;
//! Gemini usage metadata is not surfaced through the agent API.

use tracing::Span;

use crate::config::{MAX_OUTPUT_TOKENS, TEMPERATURE};

/// Span for an analysis (chat) call.
pub fn start_chat_span(model: &str, provider: &str) -> Span {
    tracing::info_span!(
        "gen_ai.chat",
        "gen_ai.operation.name" = "chat",
        "gen_ai.request.model" = model,
        "gen_ai.provider.name" = provider,
        "gen_ai.request.temperature" = TEMPERATURE,
        "gen_ai.request.max_tokens" = MAX_OUTPUT_TOKENS,
        "gen_ai.usage.input_tokens" = tracing::field::Empty,
        "gen_ai.usage.output_tokens" = tracing::field::Empty,
    )
}

/// Span for an embedding call.
pub fn start_embedding_span(model: &str, provider: &str) -> Span {
    tracing::info_span!(
        "gen_ai.embeddings",
        "gen_ai.operation.name" = "embeddings",
        "gen_ai.request.model" = model,
        "gen_ai.provider.name" = provider,
        "gen_ai.usage.input_tokens" = tracing::field::Empty,
        "gen_ai.usage.output_tokens" = tracing::field::Empty,
    )
}

/// Fill in the `gen_ai.usage.*` fields of a span from the helpers above.
pub fn record_token_usage(span: &Span, input: u64, output: u64) {
    span.record("gen_ai.usage.input_tokens", input);
    span.record("gen_ai.usage.output_tokens", output);
}
