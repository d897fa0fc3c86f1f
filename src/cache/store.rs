//! Flat-file quote cache
//!
//! Provides a `CacheStore` that keeps previously fetched quotes in a
//! comma-delimited text file with a header row, plus a separate marker file
//! holding the time of the last successful write.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::collections::HashSet;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::data::PriceQuote;

/// Header written as the first line of a new cache file
pub const CACHE_HEADER: &str = "Symbol,Price";

/// Default cache file name inside a cache directory
pub const CACHE_FILE_NAME: &str = "stocks.csv";

/// Default marker file name inside a cache directory
pub const MARKER_FILE_NAME: &str = "last_updated.txt";

/// Errors that can occur when reading or writing the cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// The file does not exist yet
    #[error("Cache file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Filesystem error
    #[error("Cache I/O error: {0}")]
    Io(#[from] io::Error),

    /// The last-updated marker does not hold a timestamp
    #[error("Invalid last-updated timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Reads and writes the quote cache file
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Path of the quote cache file
    cache_path: PathBuf,
    /// Path of the last-updated marker file
    marker_path: PathBuf,
}

impl CacheStore {
    /// Creates a store over explicit cache and marker paths
    pub fn new(cache_path: impl Into<PathBuf>, marker_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            marker_path: marker_path.into(),
        }
    }

    /// Creates a store keeping both files inside `dir`
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(CACHE_FILE_NAME), dir.join(MARKER_FILE_NAME))
    }

    /// Path of the quote cache file
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Path of the last-updated marker file
    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// Reads every cached quote
    ///
    /// The first line is treated as a header and skipped without being parsed.
    /// Lines that cannot be parsed are skipped with a warning.
    ///
    /// # Returns
    /// * `Ok(Vec<PriceQuote>)` in file order
    /// * `Err(CacheError::NotFound)` if the cache file does not exist
    pub async fn read(&self) -> Result<Vec<PriceQuote>, CacheError> {
        let content = read_existing(&self.cache_path).await?;
        Ok(parse_cache(&content))
    }

    /// Writes quotes to the cache
    ///
    /// Creates the file (with header) when it is missing, rewrites it when
    /// `overwrite` is set, and appends otherwise. The last-updated marker is
    /// refreshed after every successful write.
    pub async fn append(&self, quotes: &[PriceQuote], overwrite: bool) -> Result<(), CacheError> {
        let rows = render_rows(quotes);

        if overwrite || !fs::try_exists(&self.cache_path).await? {
            ensure_parent(&self.cache_path).await?;
            fs::write(&self.cache_path, format!("{}\n{}", CACHE_HEADER, rows)).await?;
        } else {
            let separator = if self.ends_with_newline().await? { "" } else { "\n" };
            let mut file = OpenOptions::new()
                .append(true)
                .open(&self.cache_path)
                .await?;
            file.write_all(format!("{}{}", separator, rows).as_bytes())
                .await?;
            file.flush().await?;
        }

        log::debug!(
            "Wrote {} quote(s) to {}",
            quotes.len(),
            self.cache_path.display()
        );
        self.touch_last_updated().await
    }

    /// Reads the time of the last successful cache write
    pub async fn last_updated(&self) -> Result<DateTime<Utc>, CacheError> {
        let content = read_existing(&self.marker_path).await?;
        let trimmed = content.trim();
        DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| CacheError::InvalidTimestamp(trimmed.to_string()))
    }

    /// Returns whether the last write is older than `max_age`
    ///
    /// A missing marker counts as stale.
    pub async fn is_stale(&self, max_age: Duration) -> Result<bool, CacheError> {
        match self.last_updated().await {
            Ok(updated) => Ok(Utc::now() - updated > max_age),
            Err(CacheError::NotFound(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    async fn touch_last_updated(&self) -> Result<(), CacheError> {
        ensure_parent(&self.marker_path).await?;
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        fs::write(&self.marker_path, stamp).await?;
        Ok(())
    }

    /// Whether the existing cache file is empty or ends with a line break
    async fn ends_with_newline(&self) -> io::Result<bool> {
        let mut file = fs::File::open(&self.cache_path).await?;
        if file.metadata().await?.len() == 0 {
            return Ok(true);
        }
        file.seek(SeekFrom::End(-1)).await?;
        Ok(file.read_u8().await? == b'\n')
    }
}

/// Returns the requested symbols that have no cached quote, in request order
pub fn not_in_cache(requested: &[String], cached: &[PriceQuote]) -> Vec<String> {
    let cached_symbols: HashSet<&str> = cached.iter().map(|q| q.symbol.as_str()).collect();
    requested
        .iter()
        .filter(|symbol| !cached_symbols.contains(symbol.as_str()))
        .cloned()
        .collect()
}

/// Parses a whole cache file, skipping the header line
fn parse_cache(content: &str) -> Vec<PriceQuote> {
    content
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_line(line);
            if parsed.is_none() {
                log::warn!("Skipping malformed cache line: {:?}", line);
            }
            parsed
        })
        .collect()
}

/// Parses one cache row into a quote
///
/// Accepts `SYMBOL,PRICE`, the legacy `SYMBOL PRICE` form and the raw
/// `SYMBOL: PRICE$` form. Carriage returns and trailing `$` are stripped.
pub fn parse_line(line: &str) -> Option<PriceQuote> {
    let cleaned = line.replace('\r', "");
    let cleaned = cleaned.trim();

    let (symbol, price) = if let Some((symbol, rest)) = cleaned.split_once(',') {
        (symbol, rest.split(',').next().unwrap_or_default())
    } else if let Some(pair) = cleaned.split_once(':') {
        pair
    } else {
        // Legacy rows: the price is the last field, symbols may contain spaces
        cleaned
            .trim_end_matches('$')
            .trim_end()
            .rsplit_once(char::is_whitespace)?
    };

    let symbol = symbol.trim();
    let price = price.trim().trim_end_matches('$').trim_end();
    if symbol.is_empty() || price.is_empty() {
        return None;
    }
    Some(PriceQuote::new(symbol, price))
}

fn render_rows(quotes: &[PriceQuote]) -> String {
    quotes
        .iter()
        .map(|q| format!("{},{}\n", q.symbol, q.price))
        .collect()
}

async fn read_existing(path: &Path) -> Result<String, CacheError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CacheError::NotFound(path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

async fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}
