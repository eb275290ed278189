//! Configuration file parser for ~/.config/newsline/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::feed::ListingTab;
use crate::util::{validate_base_url, UrlValidationError};

/// Environment variable that overrides `api_key` from the file
pub const API_KEY_ENV: &str = "NEWSLINE_API_KEY";

pub const DEFAULT_API_BASE_URL: &str = "https://news-api.example.com";

const KNOWN_KEYS: [&str; 5] = [
    "api_base_url",
    "api_key",
    "request_timeout_secs",
    "cache_max_age_minutes",
    "default_tab",
];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid api_base_url: {0}")]
    BaseUrl(#[from] UrlValidationError),

    #[error("No API key: set NEWSLINE_API_KEY or api_key in the config file")]
    MissingApiKey,
}

// ============================================================================
// Configuration
// ============================================================================

/// Application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// `Debug` masks the API key.
#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the news API; endpoint paths are joined onto it.
    pub api_base_url: String,

    /// API credential. [`API_KEY_ENV`] takes precedence when set.
    #[serde(deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// How old the offline cache may be before it is reported stale.
    pub cache_max_age_minutes: u64,

    /// Tab shown by `newsline feed` when `--tab` is not given.
    pub default_tab: ListingTab,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            request_timeout_secs: 30,
            cache_max_age_minutes: 60,
            default_tab: ListingTab::All,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cache_max_age_minutes", &self.cache_max_age_minutes)
            .field("default_tab", &self.default_tab)
            .finish()
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|key| !key.trim().is_empty())
        .map(SecretString::from))
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse TOML text into a config.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            api_base_url = %config.api_base_url,
            default_tab = %config.default_tab,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// The validated API base URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Ok(validate_base_url(&self.api_base_url)?)
    }

    /// The API key from [`API_KEY_ENV`], falling back to the file.
    pub fn api_key(&self) -> Result<SecretString, ConfigError> {
        self.resolve_api_key(std::env::var(API_KEY_ENV).ok())
    }

    fn resolve_api_key(&self, env_value: Option<String>) -> Result<SecretString, ConfigError> {
        if let Some(key) = env_value.filter(|k| !k.trim().is_empty()) {
            return Ok(SecretString::from(key));
        }
        self.api_key
            .as_ref()
            .map(|key| SecretString::from(key.expose_secret().to_owned()))
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_minutes.saturating_mul(60))
    }
}

// ============================================================================
// Tests
// ============================================================================
