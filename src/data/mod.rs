//! Core data models and quote providers
//!
//! This module contains the quote types shared by the cache store and the fetch
//! orchestrator, plus the remote providers that produce them.

pub mod finnhub;
pub mod marketstack;
pub mod provider;

pub use finnhub::SingleSymbolProvider;
pub use marketstack::MultiSymbolProvider;
pub use provider::{ProviderError, QuoteProvider};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single price quote for a ticker symbol
///
/// The price is kept as text exactly as it was fetched or read from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Ticker symbol, e.g. "TSLA"
    pub symbol: String,
    /// Decimal-formatted price without a currency marker, e.g. "245.30"
    pub price: String,
}

impl PriceQuote {
    /// Creates a new quote from anything string-like
    pub fn new(symbol: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price: price.into(),
        }
    }
}

impl fmt::Display for PriceQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}$", self.symbol, self.price)
    }
}

/// Policy controlling whether the cache, the remote provider, or both are used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Never contact the remote provider
    CacheOnly,
    /// Serve cached symbols, fetch only the missing ones
    #[default]
    Normal,
    /// Ignore the cache for the decision and fetch every requested symbol
    NoCache,
}

/// What a fetch returns when the remote provider fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Discard everything and return an empty list
    ReturnEmpty,
    /// Return whatever was already read from the cache
    #[default]
    ReturnCached,
}

/// Collapses quotes into a symbol → price mapping
///
/// The last occurrence of a symbol wins. The cache is append-only, so the
/// newest row for a symbol is the one shown.
pub fn to_price_map(quotes: &[PriceQuote]) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for quote in quotes {
        map.insert(quote.symbol.clone(), quote.price.clone());
    }
    map
}

/// Formats a numeric price the way it is stored in the cache
///
/// At least two decimals are shown; sub-cent prices keep their full digits.
pub fn format_price(price: f64) -> String {
    let fixed = format!("{:.2}", price);
    if fixed.parse::<f64>().ok() == Some(price) {
        fixed
    } else {
        price.to_string()
    }
}
