// Configuration for the feed handlers
// Flat JSON file, one per handler role (config/quote.json, config/trade.json)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Feed handler configuration.
///
/// `symbols` are given lowercase for the stream subscription and uppercased
/// for internal keys by the handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub symbols: Vec<String>,
    pub sink_host: String,
    pub sink_port: u16,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub log_level: String,
    pub log_file: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            sink_host: "localhost".to_string(),
            sink_port: 5010,
            initial_backoff_ms: 1000,
            max_backoff_ms: 8000,
            log_level: "info".to_string(),
            log_file: String::new(),
        }
    }
}

impl FeedConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(Path::new(path))?;
        let config: FeedConfig = serde_json::from_str(&content)?;
        config.validate()?;

        info!(
            path = path,
            symbols = ?config.symbols,
            sink = %format!("{}:{}", config.sink_host, config.sink_port),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Reject configurations the handlers cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Validation("symbols list is empty".to_string()));
        }
        if self.initial_backoff_ms == 0 {
            return Err(ConfigError::Validation(
                "initial_backoff_ms must be positive".to_string(),
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::Validation(
                "max_backoff_ms must be >= initial_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Symbols lowercased for stream names.
    pub fn stream_symbols(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.to_lowercase()).collect()
    }

    /// Symbols uppercased for internal keys.
    pub fn internal_symbols(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.to_uppercase()).collect()
    }
}
