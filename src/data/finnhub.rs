//! finnhub quote API client
//!
//! Fetches the current price of exactly one symbol per request.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::provider::{ProviderError, QuoteProvider};
use super::{format_price, PriceQuote};

/// Base URL for the finnhub API
const FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Environment variable holding the finnhub token
pub const FINNHUB_KEY_VAR: &str = "STOCK_V2_API_KEY";

/// Response from the `quote` endpoint
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
}

/// Client for the finnhub `quote` endpoint
#[derive(Debug, Clone)]
pub struct SingleSymbolProvider {
    http_client: Client,
    token: Option<String>,
    base_url: String,
}

impl SingleSymbolProvider {
    /// Creates a new provider using the public finnhub endpoint
    pub fn new(token: Option<String>) -> Self {
        Self::with_base_url(token, FINNHUB_BASE_URL)
    }

    /// Creates a new provider against a custom base URL
    pub fn with_base_url(token: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            token,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl QuoteProvider for SingleSymbolProvider {
    fn name(&self) -> &'static str {
        "finnhub"
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<PriceQuote>, ProviderError> {
        let symbol = match symbols {
            [symbol] => symbol,
            _ => {
                return Err(ProviderError::Unsupported(format!(
                    "finnhub quotes one symbol per request, got {}",
                    symbols.len()
                )))
            }
        };
        let token = self
            .token
            .as_deref()
            .ok_or(ProviderError::MissingCredential(FINNHUB_KEY_VAR))?;

        let response = self
            .http_client
            .get(format!("{}/quote", self.base_url))
            .query(&[("symbol", symbol.as_str()), ("token", token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        let quote: QuoteResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let price = quote
            .c
            .ok_or_else(|| ProviderError::Malformed(format!("missing price for {}", symbol)))?;

        Ok(vec![PriceQuote::new(symbol.clone(), format_price(price))])
    }
}
