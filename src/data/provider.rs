//! Remote quote provider interface

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::PriceQuote;

/// Errors that can occur when fetching quotes from a remote provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API credential configured for this provider
    #[error("Missing API credential: set {0}")]
    MissingCredential(&'static str),

    /// HTTP request failed
    ///
    /// The request URL is stripped since it carries the API key.
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// Provider answered with a non-success status
    #[error("Provider returned HTTP {0}")]
    Status(u16),

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Request shape not supported by this provider
    #[error("Unsupported request: {0}")]
    Unsupported(String),

    /// Provider did not answer in time
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        ProviderError::Request(error.without_url())
    }
}

/// A remote source of price quotes
///
/// Implementations return quotes in the order the symbols were requested and
/// treat a request as all-or-nothing.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Short name used in log records
    fn name(&self) -> &'static str;

    /// Fetches one quote per requested symbol
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<PriceQuote>, ProviderError>;
}
