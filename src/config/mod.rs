//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.
//! Nothing else in the crate reads the process environment; components get
//! what they need from a `&Config`.

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_MAX_INPUT_CHARS: usize = 50_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Upper bound on analysis output tokens.
pub const MAX_OUTPUT_TOKENS: u64 = 2000;
/// Low sampling temperature keeps summaries factual.
pub const TEMPERATURE: f64 = 0.2;

#[derive(Debug)]
pub struct Config {
    pub api_key: SecretString,
    pub index_dir: PathBuf,
    pub analysis_model: String,
    pub embedding_model: String,
    pub max_input_chars: usize,
    pub request_timeout: Duration,
    pub source_session: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: SecretString::from(required_var("GEMINI_API_KEY")?),
            index_dir: match std::env::var("MEMORY_INDEX_DIR") {
                Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
                _ => default_index_dir()?,
            },
            analysis_model: var_or("MNEMO_ANALYSIS_MODEL", DEFAULT_ANALYSIS_MODEL),
            embedding_model: var_or("MNEMO_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            max_input_chars: parsed_var("MNEMO_MAX_INPUT_CHARS", DEFAULT_MAX_INPUT_CHARS)?,
            request_timeout: Duration::from_secs(parsed_var(
                "MNEMO_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            source_session: var_or("MNEMO_SOURCE_SESSION", "main"),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: var_or("LOG_LEVEL", "warn"),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!(
            "required environment variable {name} is not set"
        ))),
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid value for {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// `~/memory/index`, resolved through the platform's home directory.
fn default_index_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join("memory").join("index"))
        .ok_or_else(|| {
            Error::Config("cannot resolve home directory; set MEMORY_INDEX_DIR".to_string())
        })
}
