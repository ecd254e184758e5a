//! Configuration
//!
//! Model provider settings come from the environment (a `.env` file is loaded by
//! the binary). Pipeline tuning is plain data passed to the constructors; the
//! core never reads process-wide state on its own.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_DATABASE: &str = "data/nl2sql.db";

/// API key value shipped in example `.env` files.
pub const PLACEHOLDER_API_KEY: &str = "placeholder_key";

/// Settings for the chat-completions provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 500,
            top_p: 0.9,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Read `OPENROUTER_API_KEY`, `OPENROUTER_BASE_URL` and `MODEL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        match std::env::var("OPENROUTER_API_KEY") {
            Ok(key) if !key.trim().is_empty() => config.api_key = Some(key.trim().to_string()),
            _ => {
                warn!("OPENROUTER_API_KEY not found in environment variables");
                warn!("Create a .env file with your API key to enable query generation");
            }
        }

        match std::env::var("OPENROUTER_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => config.base_url = url.trim().to_string(),
            _ => warn!("OPENROUTER_BASE_URL not found, using default {}", DEFAULT_BASE_URL),
        }

        if let Ok(model) = std::env::var("MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }

        config
    }

    /// A key is usable when present and not the example placeholder.
    pub fn is_configured(&self) -> bool {
        matches!(&self.api_key, Some(key) if !key.is_empty() && key != PLACEHOLDER_API_KEY)
    }
}

/// Caps on how much sample data ends up in the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLimits {
    /// Full sample rows rendered as name/value pairs
    pub sample_rows: usize,

    /// Rows scanned when collecting distinct values of text columns
    pub distinct_window: usize,

    /// Distinct values listed per text column
    pub distinct_values: usize,

    /// Longest rendered cell, in characters
    pub max_value_chars: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            sample_rows: 3,
            distinct_window: 20,
            distinct_values: 5,
            max_value_chars: 80,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub context: ContextLimits,

    /// Statement opening seeded at the end of the user prompt. The model is
    /// expected to continue from it, so the sanitizer puts it back.
    pub answer_prefix: Option<String>,
}

/// Where the binary keeps uploaded tables and the query history.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub query_log: Option<PathBuf>,
    pub sample_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            query_log: None,
            sample_limit: 20,
        }
    }
}

impl StorageConfig {
    /// Read `NL2SQL_DATABASE` and `NL2SQL_QUERY_LOG`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("NL2SQL_DATABASE") {
            if !path.trim().is_empty() {
                config.database = PathBuf::from(path.trim());
            }
        }
        if let Ok(path) = std::env::var("NL2SQL_QUERY_LOG") {
            if !path.trim().is_empty() {
                config.query_log = Some(PathBuf::from(path.trim()));
            }
        }
        config
    }
}
