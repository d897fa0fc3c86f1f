//! Cache-aware quote fetching
//!
//! `Fetcher` decides per request whether quotes come from the cache, the remote
//! provider, or both, persists freshly fetched quotes, and never surfaces a
//! failure to its caller. Failures are recorded through the `Reporter` and
//! answered according to the configured `FailurePolicy`.

use log::Level;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{not_in_cache, CacheError, CacheStore};
use crate::data::{FailurePolicy, FetchMode, PriceQuote, ProviderError, QuoteProvider};
use crate::report::{LogReporter, Reporter};

/// Default upper bound for a single provider request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables for a `Fetcher`
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// What to return when the provider fails
    pub failure_policy: FailurePolicy,
    /// Upper bound for a provider request; expiry counts as a failure
    pub timeout: Duration,
    /// When set, a cache older than this is treated as missing in normal mode
    pub stale_after: Option<chrono::Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            stale_after: None,
        }
    }
}

/// Serves quote requests from the cache and a remote provider
pub struct Fetcher {
    store: CacheStore,
    provider: Box<dyn QuoteProvider>,
    reporter: Arc<dyn Reporter>,
    options: FetchOptions,
}

impl Fetcher {
    /// Creates a fetcher that reports through the `log` facade
    pub fn new(store: CacheStore, provider: Box<dyn QuoteProvider>) -> Self {
        Self {
            store,
            provider,
            reporter: Arc::new(LogReporter),
            options: FetchOptions::default(),
        }
    }

    /// Replaces the reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces the fetch options
    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    /// The cache store backing this fetcher
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Returns quotes for `symbols` according to `mode`
    ///
    /// Freshly fetched quotes come first, followed by the cached quotes. When
    /// nothing needs fetching, or in cache-only mode, the cached quotes are
    /// returned unchanged. Provider failures never propagate; the result then
    /// depends on the failure policy.
    pub async fn fetch(&self, symbols: &[String], mode: FetchMode) -> Vec<PriceQuote> {
        let (cached, missing) = match self.lookup(symbols, mode).await {
            Ok(lookup) => lookup,
            Err(e) => {
                self.report(Level::Error, format!("Retrieving data from cache failed: {}", e));
                return Vec::new();
            }
        };
        if mode != FetchMode::NoCache {
            self.report(
                Level::Info,
                format!(
                    "Retrieved data from cache ({} cached, {} to fetch)",
                    cached.len(),
                    missing.len()
                ),
            );
        }

        if missing.is_empty() || mode == FetchMode::CacheOnly {
            return cached;
        }

        self.report(
            Level::Debug,
            format!("Requesting {} from {}", missing.join(","), self.provider.name()),
        );
        match self.fetch_remote(&missing).await {
            Ok(fresh) => {
                if let Err(e) = self.store.append(&fresh, false).await {
                    self.report(Level::Warn, format!("Writing quotes to cache failed: {}", e));
                }
                self.report(
                    Level::Info,
                    format!("Fetched {} quote(s) from {}", fresh.len(), self.provider.name()),
                );
                merge(fresh, cached)
            }
            Err(e) => {
                self.report(
                    Level::Error,
                    format!("Fetching stock data from {} failed: {}", self.provider.name(), e),
                );
                match self.options.failure_policy {
                    FailurePolicy::ReturnEmpty => Vec::new(),
                    FailurePolicy::ReturnCached => cached,
                }
            }
        }
    }

    /// Single-symbol form of [`Fetcher::fetch`]
    pub async fn fetch_one(&self, symbol: &str, mode: FetchMode) -> Vec<PriceQuote> {
        self.fetch(&[symbol.to_string()], mode).await
    }

    /// Reads the cache and works out which symbols still need fetching
    async fn lookup(
        &self,
        symbols: &[String],
        mode: FetchMode,
    ) -> Result<(Vec<PriceQuote>, Vec<String>), CacheError> {
        if mode == FetchMode::NoCache {
            return Ok((Vec::new(), symbols.to_vec()));
        }

        let cached = match self.store.read().await {
            Ok(quotes) => quotes,
            Err(CacheError::NotFound(_)) => {
                self.report(Level::Debug, "No cache file yet, starting empty".to_string());
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if mode == FetchMode::Normal && self.cache_is_stale().await {
            return Ok((cached, symbols.to_vec()));
        }

        let missing = not_in_cache(symbols, &cached);
        Ok((cached, missing))
    }

    async fn cache_is_stale(&self) -> bool {
        let Some(max_age) = self.options.stale_after else {
            return false;
        };
        match self.store.is_stale(max_age).await {
            Ok(true) => {
                self.report(Level::Info, "Cache is stale, refreshing requested symbols".to_string());
                true
            }
            Ok(false) => false,
            Err(e) => {
                self.report(Level::Warn, format!("Could not check cache age: {}", e));
                true
            }
        }
    }

    async fn fetch_remote(&self, symbols: &[String]) -> Result<Vec<PriceQuote>, ProviderError> {
        let timeout = self.options.timeout;
        tokio::time::timeout(timeout, self.provider.fetch_quotes(symbols))
            .await
            .map_err(|_| ProviderError::Timeout(timeout))?
    }

    fn report(&self, level: Level, message: String) {
        self.reporter.record(level, &message);
    }
}

/// Fresh quotes first, then cached quotes for symbols that were not refreshed
fn merge(fresh: Vec<PriceQuote>, cached: Vec<PriceQuote>) -> Vec<PriceQuote> {
    let refreshed: HashSet<String> = fresh.iter().map(|q| q.symbol.clone()).collect();
    let mut merged = fresh;
    merged.extend(cached.into_iter().filter(|q| !refreshed.contains(&q.symbol)));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MultiSymbolProvider;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Provider serving fixed prices and recording every request
    #[derive(Clone, Default)]
    struct FakeProvider {
        prices: HashMap<String, String>,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl FakeProvider {
        fn with_prices(prices: &[(&str, &str)]) -> Self {
            Self {
                prices: prices
                    .iter()
                    .map(|(s, p)| (s.to_string(), p.to_string()))
                    .collect(),
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QuoteProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<PriceQuote>, ProviderError> {
            self.calls.lock().unwrap().push(symbols.to_vec());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ProviderError::Status(503));
            }
            symbols
                .iter()
                .map(|s| {
                    self.prices
                        .get(s)
                        .map(|p| PriceQuote::new(s.clone(), p.clone()))
                        .ok_or_else(|| ProviderError::Malformed(format!("unknown {}", s)))
                })
                .collect()
        }
    }

    /// Reporter keeping every record in memory
    #[derive(Default)]
    struct RecordingReporter {
        records: Mutex<Vec<(Level, String)>>,
    }

    impl Reporter for RecordingReporter {
        fn record(&self, level: Level, message: &str) {
            self.records.lock().unwrap().push((level, message.to_string()));
        }
    }

    impl RecordingReporter {
        fn has(&self, level: Level) -> bool {
            self.records.lock().unwrap().iter().any(|(l, _)| *l == level)
        }

        fn mentions(&self, text: &str) -> bool {
            self.records.lock().unwrap().iter().any(|(_, m)| m.contains(text))
        }
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn create_fetcher(provider: &FakeProvider) -> (Fetcher, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = CacheStore::with_dir(temp_dir.path());
        (Fetcher::new(store, Box::new(provider.clone())), temp_dir)
    }

    async fn seed(fetcher: &Fetcher, quotes: &[(&str, &str)]) {
        let quotes: Vec<PriceQuote> = quotes.iter().map(|(s, p)| PriceQuote::new(*s, *p)).collect();
        fetcher.store().append(&quotes, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_absent_cache_fetches_and_persists() {
        let provider = FakeProvider::with_prices(&[("TSLA", "245.30")]);
        let (fetcher, _temp_dir) = create_fetcher(&provider);

        let quotes = fetcher.fetch(&symbols(&["TSLA"]), FetchMode::Normal).await;

        assert_eq!(quotes, vec![PriceQuote::new("TSLA", "245.30")]);
        let content = std::fs::read_to_string(fetcher.store().cache_path()).unwrap();
        assert_eq!(content, "Symbol,Price\nTSLA,245.30\n");
    }

    #[tokio::test]
    async fn test_partial_cache_fetches_missing_fresh_first() {
        let provider = FakeProvider::with_prices(&[("AAPL", "190.00")]);
        let (fetcher, _temp_dir) = create_fetcher(&provider);
        seed(&fetcher, &[("TSLA", "245.30")]).await;

        let quotes = fetcher
            .fetch(&symbols(&["TSLA", "AAPL"]), FetchMode::Normal)
            .await;

        assert_eq!(
            quotes,
            vec![
                PriceQuote::new("AAPL", "190.00"),
                PriceQuote::new("TSLA", "245.30")
            ]
        );
        assert_eq!(provider.calls(), vec![symbols(&["AAPL"])]);
    }

    #[tokio::test]
    async fn test_second_normal_fetch_is_served_from_cache() {
        let provider = FakeProvider::with_prices(&[("TSLA", "245.30"), ("AAPL", "190.00")]);
        let (fetcher, _temp_dir) = create_fetcher(&provider);
        let requested = symbols(&["TSLA", "AAPL"]);

        let first = fetcher.fetch(&requested, FetchMode::Normal).await;
        let second = fetcher.fetch(&requested, FetchMode::Normal).await;

        assert_eq!(first, second);
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_only_never_calls_provider() {
        let provider = FakeProvider::with_prices(&[("AAPL", "190.00")]);
        let (fetcher, _temp_dir) = create_fetcher(&provider);

        let empty = fetcher.fetch(&symbols(&["AAPL"]), FetchMode::CacheOnly).await;
        seed(&fetcher, &[("TSLA", "245.30")]).await;
        let partial = fetcher
            .fetch(&symbols(&["TSLA", "AAPL"]), FetchMode::CacheOnly)
            .await;

        assert!(empty.is_empty());
        assert_eq!(partial, vec![PriceQuote::new("TSLA", "245.30")]);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_cache_fetches_every_symbol_and_writes() {
        let provider = FakeProvider::with_prices(&[("TSLA", "250.00"), ("AAPL", "190.00")]);
        let (fetcher, _temp_dir) = create_fetcher(&provider);
        seed(&fetcher, &[("TSLA", "245.30")]).await;

        let quotes = fetcher
            .fetch(&symbols(&["TSLA", "AAPL"]), FetchMode::NoCache)
            .await;

        assert_eq!(
            quotes,
            vec![
                PriceQuote::new("TSLA", "250.00"),
                PriceQuote::new("AAPL", "190.00")
            ]
        );
        assert_eq!(provider.calls(), vec![symbols(&["TSLA", "AAPL"])]);
        let cached = fetcher.store().read().await.unwrap();
        assert_eq!(cached.len(), 3);
    }

    #[tokio::test]
    async fn test_provider_failure_with_return_empty_policy() {
        let provider = FakeProvider::failing();
        let (fetcher, _temp_dir) = create_fetcher(&provider);
        let fetcher = fetcher.with_options(FetchOptions {
            failure_policy: FailurePolicy::ReturnEmpty,
            ..Default::default()
        });
        seed(&fetcher, &[("TSLA", "245.30")]).await;

        let quotes = fetcher
            .fetch(&symbols(&["TSLA", "AAPL"]), FetchMode::Normal)
            .await;

        assert!(quotes.is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_returns_cached_by_default() {
        let provider = FakeProvider::failing();
        let reporter = Arc::new(RecordingReporter::default());
        let (fetcher, _temp_dir) = create_fetcher(&provider);
        let fetcher = fetcher.with_reporter(reporter.clone());
        seed(&fetcher, &[("TSLA", "245.30")]).await;

        let quotes = fetcher
            .fetch(&symbols(&["TSLA", "AAPL"]), FetchMode::Normal)
            .await;

        assert_eq!(quotes, vec![PriceQuote::new("TSLA", "245.30")]);
        assert!(reporter.has(Level::Error));
    }

    #[tokio::test]
    async fn test_http_error_from_marketstack_returns_empty() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::with_dir(temp_dir.path());
        let provider = MultiSymbolProvider::with_base_url(Some("key".to_string()), server.uri());
        let fetcher = Fetcher::new(store, Box::new(provider)).with_options(FetchOptions {
            failure_policy: FailurePolicy::ReturnEmpty,
            ..Default::default()
        });
        seed(&fetcher, &[("TSLA", "245.30")]).await;

        let quotes = fetcher
            .fetch(&symbols(&["TSLA", "AAPL"]), FetchMode::Normal)
            .await;

        assert!(quotes.is_empty());
        assert_eq!(fetcher.store().read().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let provider = FakeProvider {
            delay: Some(Duration::from_millis(500)),
            ..FakeProvider::with_prices(&[("AAPL", "190.00")])
        };
        let reporter = Arc::new(RecordingReporter::default());
        let (fetcher, _temp_dir) = create_fetcher(&provider);
        let fetcher = fetcher
            .with_reporter(reporter.clone())
            .with_options(FetchOptions {
                timeout: Duration::from_millis(20),
                ..Default::default()
            });

        let quotes = fetcher.fetch(&symbols(&["AAPL"]), FetchMode::Normal).await;

        assert!(quotes.is_empty());
        assert!(reporter.has(Level::Error));
        assert!(!fetcher.store().cache_path().exists());
    }

    #[tokio::test]
    async fn test_stale_cache_refetches_in_normal_mode() {
        let provider = FakeProvider::with_prices(&[("TSLA", "250.00")]);
        let (fetcher, _temp_dir) = create_fetcher(&provider);
        let fetcher = fetcher.with_options(FetchOptions {
            stale_after: Some(chrono::Duration::hours(2)),
            ..Default::default()
        });
        seed(&fetcher, &[("TSLA", "245.30"), ("U", "22.10")]).await;
        std::fs::write(fetcher.store().marker_path(), "2020-01-01T00:00:00.000Z").unwrap();

        let quotes = fetcher.fetch(&symbols(&["TSLA"]), FetchMode::Normal).await;

        assert_eq!(
            quotes,
            vec![
                PriceQuote::new("TSLA", "250.00"),
                PriceQuote::new("U", "22.10")
            ]
        );
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_cache_ignores_staleness_window() {
        let provider = FakeProvider::with_prices(&[("TSLA", "250.00")]);
        let (fetcher, _temp_dir) = create_fetcher(&provider);
        let fetcher = fetcher.with_options(FetchOptions {
            stale_after: Some(chrono::Duration::hours(2)),
            ..Default::default()
        });
        seed(&fetcher, &[("TSLA", "245.30")]).await;

        let quotes = fetcher.fetch(&symbols(&["TSLA"]), FetchMode::Normal).await;

        assert_eq!(quotes, vec![PriceQuote::new("TSLA", "245.30")]);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_one_uses_same_flow() {
        let provider = FakeProvider::with_prices(&[("MSFT", "410.12")]);
        let (fetcher, _temp_dir) = create_fetcher(&provider);

        let quotes = fetcher.fetch_one("MSFT", FetchMode::Normal).await;

        assert_eq!(quotes, vec![PriceQuote::new("MSFT", "410.12")]);
        assert_eq!(provider.calls(), vec![symbols(&["MSFT"])]);
    }

    #[tokio::test]
    async fn test_cache_only_after_refresh_shows_newest_price() {
        let provider = FakeProvider::with_prices(&[("TSLA", "250.00")]);
        let (fetcher, _temp_dir) = create_fetcher(&provider);
        seed(&fetcher, &[("TSLA", "245.30")]).await;

        fetcher.fetch(&symbols(&["TSLA"]), FetchMode::NoCache).await;
        let quotes = fetcher.fetch(&symbols(&["TSLA"]), FetchMode::CacheOnly).await;

        assert_eq!(quotes.len(), 2);
        let prices = crate::data::to_price_map(&quotes);
        assert_eq!(prices.get("TSLA").map(String::as_str), Some("250.00"));
    }

    #[tokio::test]
    async fn test_no_cache_does_not_report_cache_status() {
        let provider = FakeProvider::with_prices(&[("TSLA", "250.00")]);
        let reporter = Arc::new(RecordingReporter::default());
        let (fetcher, _temp_dir) = create_fetcher(&provider);
        let fetcher = fetcher.with_reporter(reporter.clone());
        seed(&fetcher, &[("TSLA", "245.30")]).await;

        fetcher.fetch(&symbols(&["TSLA"]), FetchMode::NoCache).await;
        assert!(!reporter.mentions("Retrieved data from cache"));

        fetcher.fetch(&symbols(&["TSLA"]), FetchMode::Normal).await;
        assert!(reporter.mentions("Retrieved data from cache"));
    }

    #[test]
    fn test_merge_drops_refreshed_cache_rows() {
        let merged = merge(
            vec![PriceQuote::new("TSLA", "250.00")],
            vec![PriceQuote::new("TSLA", "245.30"), PriceQuote::new("U", "22.10")],
        );

        assert_eq!(
            merged,
            vec![PriceQuote::new("TSLA", "250.00"), PriceQuote::new("U", "22.10")]
        );
    }
}
