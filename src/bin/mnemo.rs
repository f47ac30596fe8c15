//! mnemo CLI: compress conversations into memories and search them.

use std::io::Read as _;
use std::path::Path;

use clap::{Parser, Subcommand};
use mnemo_rs::config::Config;
use mnemo_rs::llm::GeminiProvider;
use mnemo_rs::memory::{CompressionPipeline, DEFAULT_TOP_K, IndexStore};
use mnemo_rs::model::MemoryRecord;
use mnemo_rs::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(
    name = "mnemo",
    about = "Compress conversations into searchable memories",
    after_help = "Examples:\n  mnemo compress \"We set up Docker today...\"\n  mnemo search docker configuration"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress a conversation into a memory record
    Compress {
        /// Text to compress. If the first argument names an existing path,
        /// that file is read and the rest are ignored. Reads stdin when omitted.
        input: Vec<String>,
    },
    /// Search memories by semantic similarity
    Search {
        /// Free-text query
        #[arg(required = true)]
        query: Vec<String>,
        /// Maximum results to show
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        limit: usize,
    },
    /// List the most recent memories
    List {
        /// Number of memories to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "mnemo".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let store = IndexStore::new(&config.index_dir);

    match cli.command {
        Command::Compress { input } => cmd_compress(&config, &store, input).await,
        Command::Search { query, limit } => cmd_search(&config, &store, query, limit).await,
        Command::List { limit } => cmd_list(&store, limit),
    }
}

async fn cmd_compress(
    config: &Config,
    store: &IndexStore,
    input: Vec<String>,
) -> anyhow::Result<()> {
    let text = read_input(&input)?;
    let provider = GeminiProvider::from_config(config)?;
    let pipeline = CompressionPipeline::new(config, &provider, &provider, store);

    eprintln!("Compressing with {}...", provider.analysis_model());
    let record = pipeline.compress(&text).await?;

    println!();
    println!("Saved:       {}", record.id);
    println!("Summary:     {}", record.summary);
    println!("Keywords:    {}", record.keywords.join(", "));
    println!(
        "Compression: {} ({} -> {} tokens)",
        record.compression_ratio, record.tokens_original, record.tokens_compressed
    );
    Ok(())
}

async fn cmd_search(
    config: &Config,
    store: &IndexStore,
    query: Vec<String>,
    limit: usize,
) -> anyhow::Result<()> {
    let query = query.join(" ");
    let provider = GeminiProvider::from_config(config)?;
    let pipeline = CompressionPipeline::new(config, &provider, &provider, store);

    eprintln!("Searching for: {query}");
    let results = pipeline.search(&query, limit).await?;

    if results.is_empty() {
        println!("No results found.");
        println!("Index directory: {}", store.root().display());
        return Ok(());
    }

    println!("\nFound {} relevant memories:\n", results.len());
    for (rank, hit) in results.iter().enumerate() {
        let r = &hit.record;
        println!("{}. [{}] (similarity: {:.4})", rank + 1, r.id, hit.similarity);
        println!("   {}", r.summary);
        println!("   keywords: {}", first_keywords(r));
        println!("   date:     {}", r.timestamp.format("%Y-%m-%d"));
        println!();
    }
    Ok(())
}

fn cmd_list(store: &IndexStore, limit: usize) -> anyhow::Result<()> {
    let total = store.load_all()?.len();
    if total == 0 {
        println!("No memories indexed yet.");
        println!("Index directory: {}", store.root().display());
        return Ok(());
    }

    println!("{total} memories indexed");
    println!("Index: {}\n", store.root().display());

    for r in store.recent(limit)? {
        println!("[{}] {}", r.id, truncate(&r.summary, 80));
        println!("  keywords: {}", first_keywords(&r));
        println!();
    }
    Ok(())
}

/// A first argument naming an existing path is read as a file; otherwise
/// the arguments are the text. No arguments means stdin.
fn read_input(args: &[String]) -> anyhow::Result<String> {
    match args {
        [] => {
            eprintln!("Reading from stdin...");
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        [first, ..] if Path::new(first).exists() => Ok(std::fs::read_to_string(first)?),
        many => Ok(many.join(" ")),
    }
}

fn first_keywords(record: &MemoryRecord) -> String {
    record
        .keywords
        .iter()
        .take(5)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_first_path_is_read_even_with_extra_args() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chat.txt");
        std::fs::write(&path, "We set up Docker today.").unwrap();

        let args = vec![path.display().to_string(), "ignored".to_string()];
        assert_eq!(read_input(&args).unwrap(), "We set up Docker today.");
    }

    #[test]
    fn plain_words_are_joined() {
        let args = vec!["no-such-file-here".to_string(), "docker".to_string()];
        assert_eq!(read_input(&args).unwrap(), "no-such-file-here docker");
    }
}
