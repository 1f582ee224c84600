//! Configuration
//!
//! Settings loaded from environment variables with sensible defaults.
//! Only the API key has no default; everything else can run untouched.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::generator::DEFAULT_API_BASE;

/// Default number of context chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 5;
/// Default chunk window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Default completion model identifier.
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// API key for the completion service; required for answering
    pub anthropic_api_key: Option<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub index_dir: PathBuf,
    pub api_base: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            index_dir: PathBuf::from("./data/index"),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty()),
            chunk_size: env_parse("PAPERQA_CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: env_parse("PAPERQA_CHUNK_OVERLAP", defaults.chunk_overlap)?,
            top_k: env_parse("PAPERQA_TOP_K", defaults.top_k)?,
            model: env::var("PAPERQA_MODEL").unwrap_or(defaults.model),
            max_tokens: env_parse("PAPERQA_MAX_TOKENS", defaults.max_tokens)?,
            temperature: env_parse("PAPERQA_TEMPERATURE", defaults.temperature)?,
            index_dir: env::var("PAPERQA_INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
            api_base: env::var("PAPERQA_API_BASE").unwrap_or(defaults.api_base),
        })
    }
}

/// Parse an env var, falling back to `default` when unset. A set but
/// malformed value is a configuration error, not a silent fallback.
fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|e| {
            ConfigError::InvalidConfiguration(format!("{}={}: {}", key, raw, e))
        }),
        Err(_) => Ok(default),
    }
}
