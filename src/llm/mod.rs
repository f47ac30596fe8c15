//! LLM provider boundary.
//!
//! The memory engine needs two things from a model provider: a text
//! analysis of some conversation, and an embedding vector for a short text.
//! Both are expressed as traits ([`Analyzer`], [`Embedder`]) so the pipeline
//! can run against in-process fakes in tests. [`GeminiProvider`] implements
//! both over rig-core's Gemini client.
//!
//! # Example
//! ```no_run
//! use mnemo_rs::config::Config;
//! use mnemo_rs::llm::{Embedder, GeminiProvider};
//!
//! # async fn run() -> mnemo_rs::error::Result<()> {
//! let config = Config::from_env()?;
//! let provider = GeminiProvider::from_config(&config)?;
//! let vector = provider.embed("docker compose networking").await?;
//! println!("{} dimensions", vector.len());
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use opentelemetry::KeyValue;
use rig::client::{CompletionClient, EmbeddingsClient};
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel as _;
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

use crate::config::{Config, MAX_OUTPUT_TOKENS, TEMPERATURE};
use crate::error::{Error, Result};
use crate::memory::builder::estimate_tokens;
use crate::telemetry::{genai, metrics};

const PROVIDER: &str = "gemini";
const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Produces a free-text analysis (expected to be JSON) for a prompt.
pub trait Analyzer {
    fn analyze(&self, prompt: &str) -> impl Future<Output = Result<String>>;
}

/// Produces an embedding vector for a short text.
///
/// Documents and queries are embedded the same way. The Gemini
/// implementation sends no `taskType`, so vectors are not tagged for
/// retrieval-document use; an index built with tagged vectors should be
/// re-embedded before mixing the two.
pub trait Embedder {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f64>>>;
}

// ---------------------------------------------------------------------------
// Prompting
// ---------------------------------------------------------------------------

/// Cut `text` to at most `max_chars` characters, appending a marker when
/// anything was dropped.
pub fn truncate_input(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}{TRUNCATION_MARKER}", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}

/// The analysis instruction wrapped around an (already truncated) input.
pub fn analysis_prompt(conversation: &str) -> String {
    format!(
        "Analyze this conversation and extract essential information for memory storage.

CONVERSATION:
{conversation}

Return a JSON object with these fields:
- summary: 2-3 sentence summary of accomplishments
- keywords: array of 5-10 specific keywords (not generic words)
- topics: array of 1-3 high-level categories
- decisions: array of key decisions made (empty array if none)
- action_items: array of pending tasks (empty array if none)
- entities: object with people (names), systems (tools/services), dates (deadlines)
- importance: \"low\", \"medium\", or \"high\"

Be concise and specific. Focus on actionable information."
    )
}

// ---------------------------------------------------------------------------
// Gemini via rig-core
// ---------------------------------------------------------------------------

/// Gemini analysis + embedding provider.
pub struct GeminiProvider {
    client: rig::providers::gemini::Client,
    analysis_model: String,
    embedding_model: String,
    timeout: Duration,
}

impl GeminiProvider {
    /// Build a provider from the loaded configuration.
    ///
    /// # Errors
    /// Returns [`Error::Upstream`] if the HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            client: gemini_client(&config.api_key)?,
            analysis_model: config.analysis_model.clone(),
            embedding_model: config.embedding_model.clone(),
            timeout: config.request_timeout,
        })
    }

    pub fn analysis_model(&self) -> &str {
        &self.analysis_model
    }
}

/// Create a Gemini client from a secret API key.
pub fn gemini_client(api_key: &SecretString) -> Result<rig::providers::gemini::Client> {
    rig::providers::gemini::Client::new(api_key.expose_secret())
        .map_err(|e| Error::Upstream(format!("failed to create Gemini client: {e}")))
}

impl Analyzer for GeminiProvider {
    async fn analyze(&self, prompt: &str) -> Result<String> {
        let span = genai::start_chat_span(&self.analysis_model, PROVIDER);

        let agent = self
            .client
            .agent(self.analysis_model.as_str())
            .temperature(TEMPERATURE)
            .max_tokens(MAX_OUTPUT_TOKENS)
            .additional_params(json_output_params())
            .build();

        let response = bounded(self.timeout, "analysis", async {
            agent
                .prompt(prompt)
                .await
                .map_err(|e| Error::Upstream(format!("analysis call failed: {e}")))
        })
        .instrument(span.clone())
        .await?;

        let (input, output) = (estimate_tokens(prompt), estimate_tokens(&response));
        genai::record_token_usage(&span, input, output);
        record_llm_tokens(&self.analysis_model, input, output);
        Ok(response)
    }
}

impl Embedder for GeminiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let span = genai::start_embedding_span(&self.embedding_model, PROVIDER);
        let model = self.client.embedding_model(self.embedding_model.as_str());

        let embedding = bounded(self.timeout, "embedding", async {
            model
                .embed_text(text)
                .await
                .map_err(|e| Error::Upstream(format!("embedding call failed: {e}")))
        })
        .instrument(span.clone())
        .await?;

        let input = estimate_tokens(text);
        genai::record_token_usage(&span, input, 0);
        record_llm_tokens(&self.embedding_model, input, 0);
        Ok(embedding.vec)
    }
}

/// Gemini only applies temperature and max tokens when a `generationConfig`
/// is present, so one is always sent. It also asks for a JSON response body.
fn json_output_params() -> serde_json::Value {
    serde_json::json!({
        "generationConfig": { "responseMimeType": "application/json" }
    })
}

/// Run an upstream call with a deadline.
async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| Error::Timeout {
            operation,
            seconds: limit.as_secs(),
        })?
}

fn record_llm_tokens(model: &str, input: u64, output: u64) {
    let counter = metrics::llm_tokens();
    let labels = |direction: &'static str| {
        [
            KeyValue::new("model", model.to_string()),
            KeyValue::new("provider", PROVIDER),
            KeyValue::new("direction", direction),
        ]
    };
    counter.add(input, &labels("input"));
    if output > 0 {
        counter.add(output, &labels("output"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one HTTP request, answer 500, and return its JSON body.
    async fn capture_request_body(listener: TcpListener) -> serde_json::Value {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the body arrived");
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = end + 4;
            if buf.len() >= body_start + len {
                socket
                    .write_all(
                        b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}",
                    )
                    .await
                    .unwrap();
                return serde_json::from_slice(&buf[body_start..body_start + len]).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn analysis_request_sends_generation_config() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(capture_request_body(listener));

        let client: rig::providers::gemini::Client = rig::providers::gemini::Client::builder()
            .api_key("test-key")
            .base_url(format!("http://{addr}"))
            .build()
            .unwrap();
        let provider = GeminiProvider {
            client,
            analysis_model: "gemini-2.0-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            timeout: Duration::from_secs(10),
        };

        // The stub answers 500; only the outgoing body matters here.
        let _ = provider.analyze("Summarize: we tuned redis").await;
        let body = server.await.unwrap();

        let generation = &body["generationConfig"];
        assert_eq!(generation["responseMimeType"], "application/json");
        assert_eq!(generation["temperature"], TEMPERATURE);
        assert_eq!(generation["maxOutputTokens"], MAX_OUTPUT_TOKENS);
    }

    #[test]
    fn short_input_is_borrowed_unchanged() {
        let out = truncate_input("hello world", 50);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, "hello world");
    }

    #[test]
    fn input_at_limit_is_not_marked() {
        assert_eq!(truncate_input("abcde", 5), "abcde");
    }

    #[test]
    fn long_input_is_cut_and_marked() {
        assert_eq!(truncate_input("abcdefgh", 5), "abcde\n...[truncated]");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_input("ééééé", 2), "éé\n...[truncated]");
    }

    #[tokio::test]
    async fn bounded_reports_timeout() {
        let result: Result<()> = bounded(Duration::from_millis(10), "analysis", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(Error::Timeout {
                operation: "analysis",
                ..
            })
        ));
    }
}
