//! Configuration file parser.
//!
//! The config file is optional. A missing file yields `Config::default()`,
//! and any subset of keys may be specified; missing keys fall back to their
//! defaults. Unknown keys are silently ignored by serde.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the paging API. Pages are fetched from
    /// `{base_url}/images?page={n}&limit={page_size}`.
    pub base_url: String,

    /// Number of items requested per page.
    pub page_size: u32,

    /// Quiet period before a search input is accepted, in milliseconds.
    pub search_debounce_ms: u64,

    /// TCP connect timeout for HTTP requests, in seconds.
    pub connect_timeout_secs: u64,

    /// Total per-request timeout (connect + body), in seconds.
    pub request_timeout_secs: u64,

    /// Maximum number of images kept in the in-memory LRU cache.
    pub image_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://picsum.photos/v2".to_string(),
            page_size: 100,
            search_debounce_ms: 1000,
            connect_timeout_secs: 30,
            request_timeout_secs: 60,
            image_cache_capacity: 256,
        }
    }
}

impl Config {
    /// Maximum config file size (64 KB). Anything larger is almost
    /// certainly not a config file.
    const MAX_FILE_SIZE: u64 = 65_536;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file -> `Ok(Config::default())`
    /// - Empty file -> `Ok(Config::default())`
    /// - Invalid TOML -> `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys -> silently accepted (serde default behavior)
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid slurping a bogus file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }
}
