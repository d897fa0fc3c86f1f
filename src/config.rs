//! Runtime settings read from the environment
//!
//! All paths and credentials are collected once into `Settings` and handed to
//! the components that need them. A `.env` file in the working directory (or
//! any ancestor) is loaded first when present.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::cache::{CacheStore, CACHE_FILE_NAME, MARKER_FILE_NAME};
use crate::fetch::{FetchOptions, DEFAULT_TIMEOUT};

/// Environment variable holding the cache file path
pub const CACHE_PATH_VAR: &str = "CACHE_STOCK_FILE_PATH";
/// Environment variable holding the last-updated marker path
pub const MARKER_PATH_VAR: &str = "LAST_UPDATED_FILE";
/// Environment variable holding the provider timeout in seconds
pub const TIMEOUT_VAR: &str = "QUOTES_TIMEOUT_SECS";
/// Environment variable enabling the staleness window, in minutes
pub const STALE_AFTER_VAR: &str = "QUOTES_STALE_AFTER_MINS";
/// Environment variable naming a file that receives log records
pub const LOG_FILE_VAR: &str = "QUOTES_LOG_FILE";

/// Errors that can occur while reading settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric setting could not be parsed
    #[error("Invalid value for {name}: '{value}' is not a whole number")]
    InvalidNumber { name: &'static str, value: String },
}

/// Settings for one run of the tool
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// marketstack access key
    pub marketstack_key: Option<String>,
    /// finnhub token
    pub finnhub_key: Option<String>,
    /// Quote cache file
    pub cache_path: PathBuf,
    /// Last-updated marker file
    pub marker_path: PathBuf,
    /// Upper bound for a provider request
    pub timeout: Duration,
    /// Cache age after which normal mode refetches, if enabled
    pub stale_after: Option<chrono::Duration>,
    /// Optional file receiving log records
    pub log_file: Option<PathBuf>,
}

impl Settings {
    /// Loads `.env` if present and reads settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let cache_path = get(CACHE_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_cache_dir().join(CACHE_FILE_NAME));
        let marker_path = get(MARKER_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| sibling(&cache_path, MARKER_FILE_NAME));

        let timeout = match get(TIMEOUT_VAR) {
            Some(value) => Duration::from_secs(parse_number(TIMEOUT_VAR, &value)?),
            None => DEFAULT_TIMEOUT,
        };
        let stale_after = get(STALE_AFTER_VAR)
            .map(|value| parse_minutes(STALE_AFTER_VAR, &value))
            .transpose()?;

        Ok(Self {
            marketstack_key: get(crate::data::marketstack::MARKETSTACK_KEY_VAR),
            finnhub_key: get(crate::data::finnhub::FINNHUB_KEY_VAR),
            cache_path,
            marker_path,
            timeout,
            stale_after,
            log_file: get(LOG_FILE_VAR).map(PathBuf::from),
        })
    }

    /// Cache store over the configured paths
    pub fn cache_store(&self) -> CacheStore {
        CacheStore::new(&self.cache_path, &self.marker_path)
    }

    /// Fetch options derived from these settings
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: self.timeout,
            stale_after: self.stale_after,
            ..FetchOptions::default()
        }
    }
}

/// Per-user cache directory, or the working directory when none exists
fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("", "", "quotecache")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn sibling(path: &Path, file_name: &str) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

fn parse_number(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        })
}

/// Parses a minute count that must fit in a `chrono::Duration`
fn parse_minutes(name: &'static str, value: &str) -> Result<chrono::Duration, ConfigError> {
    let mins = parse_number(name, value)?;
    i64::try_from(mins)
        .ok()
        .and_then(chrono::Duration::try_minutes)
        .ok_or_else(|| ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        })
}

/// Loads a `.env` file from the working directory or one of its ancestors
fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => log::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => log::warn!("Ignoring unreadable .env file: {}", e),
    }
}
