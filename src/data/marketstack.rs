//! marketstack end-of-day API client
//!
//! Fetches the latest closing price for a batch of symbols in a single request.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::provider::{ProviderError, QuoteProvider};
use super::{format_price, PriceQuote};

/// Base URL for the marketstack API (https is not available on the free plan)
const MARKETSTACK_BASE_URL: &str = "http://api.marketstack.com/v1";

/// Smallest result limit sent with a request
const MIN_RESULT_LIMIT: usize = 10;

/// Environment variable holding the marketstack access key
pub const MARKETSTACK_KEY_VAR: &str = "STOCK_API_KEY";

/// Response from the `eod/latest` endpoint
#[derive(Debug, Deserialize)]
struct EodResponse {
    data: Vec<EodEntry>,
}

/// A single end-of-day record
#[derive(Debug, Deserialize)]
struct EodEntry {
    /// Closing price
    close: Option<f64>,
}

/// Client for the marketstack `eod/latest` endpoint
///
/// Entries in the response are matched to the requested symbols by position.
#[derive(Debug, Clone)]
pub struct MultiSymbolProvider {
    http_client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl MultiSymbolProvider {
    /// Creates a new provider using the public marketstack endpoint
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, MARKETSTACK_BASE_URL)
    }

    /// Creates a new provider against a custom base URL
    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key,
            base_url: base_url.into(),
        }
    }

    /// Maps positional response entries onto the requested symbols
    fn parse_response(
        &self,
        response: EodResponse,
        symbols: &[String],
    ) -> Result<Vec<PriceQuote>, ProviderError> {
        if response.data.len() < symbols.len() {
            return Err(ProviderError::Malformed(format!(
                "expected {} entries, got {}",
                symbols.len(),
                response.data.len()
            )));
        }

        symbols
            .iter()
            .zip(response.data)
            .map(|(symbol, entry)| {
                let close = entry.close.ok_or_else(|| {
                    ProviderError::Malformed(format!("missing close price for {}", symbol))
                })?;
                Ok(PriceQuote::new(symbol.clone(), format_price(close)))
            })
            .collect()
    }
}

#[async_trait]
impl QuoteProvider for MultiSymbolProvider {
    fn name(&self) -> &'static str {
        "marketstack"
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<PriceQuote>, ProviderError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential(MARKETSTACK_KEY_VAR))?;

        let url = format!("{}/eod/latest", self.base_url);
        let limit = symbols.len().max(MIN_RESULT_LIMIT).to_string();
        let joined = symbols.join(",");

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("access_key", api_key),
                ("symbols", joined.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        let api_response: EodResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Malformed(e.to_string()))?;

        self.parse_response(api_response, symbols)
    }
}
