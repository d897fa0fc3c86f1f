//! Command-line interface for quotecache
//!
//! This module handles parsing of CLI arguments using clap and, for anything
//! not given on the command line, interactive prompts for the symbol list and
//! the fetch mode.

use clap::{Parser, ValueEnum};
use std::collections::{BTreeMap, HashSet};
use std::io::{self, BufRead, Write};
use thiserror::Error;

use crate::data::{to_price_map, FailurePolicy, FetchMode, PriceQuote};

/// Symbols offered when the symbol prompt is left empty
pub const DEFAULT_SYMBOLS: &str = "TSLA,AAPL,MSFT,GOOGL,AMZN";

/// Mode menu entries, in the order they are shown
pub const MODE_CHOICES: [(&str, FetchMode); 3] = [
    ("Offline (cache only)", FetchMode::CacheOnly),
    ("Normal (prefer cache)", FetchMode::Normal),
    ("Override (no cache)", FetchMode::NoCache),
];

/// Error types for CLI argument handling and prompts
#[derive(Debug, Error)]
pub enum CliError {
    /// The symbol list was empty after parsing
    #[error("No stock symbols given")]
    NoSymbols,

    /// The single-symbol provider was asked for several symbols
    #[error("The finnhub provider quotes one symbol at a time, got {0}")]
    TooManySymbols(usize),

    /// The mode answer matched no menu entry
    #[error("Invalid mode: '{0}'. Choose 1-3 or offline, normal, override")]
    InvalidMode(String),

    /// Reading an answer or writing a prompt failed
    #[error("Prompt failed: {0}")]
    Io(#[from] io::Error),
}

/// quotecache - Look up stock prices with a local cache
#[derive(Parser, Debug)]
#[command(name = "quotecache")]
#[command(about = "Stock price quotes with a local flat-file cache")]
#[command(version)]
pub struct Cli {
    /// Comma-separated ticker symbols, prompted for when omitted
    ///
    /// Examples:
    ///   quotecache --symbols TSLA
    ///   quotecache --symbols tsla,aapl --mode normal
    #[arg(long, value_name = "SYMBOLS")]
    pub symbols: Option<String>,

    /// Where quotes come from, prompted for when omitted
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Remote quote provider
    #[arg(long, value_enum, default_value_t = ProviderArg::Marketstack)]
    pub provider: ProviderArg,

    /// Return nothing instead of cached quotes when the provider fails
    #[arg(long)]
    pub strict_failure: bool,
}

/// Fetch mode as spelled on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Cache only, never contact the provider
    Offline,
    /// Prefer the cache, fetch missing symbols
    Normal,
    /// Ignore the cache and fetch everything
    Override,
}

impl From<ModeArg> for FetchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Offline => FetchMode::CacheOnly,
            ModeArg::Normal => FetchMode::Normal,
            ModeArg::Override => FetchMode::NoCache,
        }
    }
}

/// Remote provider choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    /// marketstack end-of-day prices, many symbols per request
    Marketstack,
    /// finnhub live quote, one symbol per request
    Finnhub,
}

/// A fully resolved quote request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    /// Upper-cased, de-duplicated symbols in input order
    pub symbols: Vec<String>,
    /// Sourcing policy
    pub mode: FetchMode,
    /// Provider to use for cache misses
    pub provider: ProviderArg,
    /// Result on provider failure
    pub failure_policy: FailurePolicy,
}

impl QuoteRequest {
    /// Resolves a request from CLI arguments, prompting for anything missing.
    ///
    /// # Returns
    /// * `Ok(QuoteRequest)` with at least one symbol
    /// * `Err(CliError)` if no symbols were given, the mode is invalid, or the
    ///   provider cannot serve the number of symbols requested
    pub fn resolve<R: BufRead, W: Write>(
        cli: &Cli,
        prompt: &mut Prompt<R, W>,
    ) -> Result<Self, CliError> {
        let symbols = match &cli.symbols {
            Some(raw) => parse_symbols(raw),
            None => prompt.symbols()?,
        };
        if symbols.is_empty() {
            return Err(CliError::NoSymbols);
        }
        if cli.provider == ProviderArg::Finnhub && symbols.len() > 1 {
            return Err(CliError::TooManySymbols(symbols.len()));
        }

        let mode = match cli.mode {
            Some(mode) => mode.into(),
            None => prompt.mode()?,
        };

        Ok(QuoteRequest {
            symbols,
            mode,
            provider: cli.provider,
            failure_policy: if cli.strict_failure {
                FailurePolicy::ReturnEmpty
            } else {
                FailurePolicy::ReturnCached
            },
        })
    }
}

/// Splits a comma-separated symbol list
///
/// Symbols are trimmed and upper-cased; empty entries and repeats are dropped.
pub fn parse_symbols(input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    input
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Parses an answer to the mode menu
///
/// Accepts the menu number, the menu label, or a `--mode` value. An empty
/// answer selects normal mode.
pub fn parse_mode_choice(input: &str) -> Result<FetchMode, CliError> {
    let answer = input.trim();
    if answer.is_empty() {
        return Ok(FetchMode::Normal);
    }
    if let Ok(index) = answer.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| MODE_CHOICES.get(i))
            .map(|(_, mode)| *mode)
            .ok_or_else(|| CliError::InvalidMode(answer.to_string()));
    }
    if let Some((_, mode)) = MODE_CHOICES
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(answer))
    {
        return Ok(*mode);
    }
    ModeArg::from_str(answer, true)
        .map(FetchMode::from)
        .map_err(|_| CliError::InvalidMode(answer.to_string()))
}

/// Line-based interactive prompts
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    /// Creates a prompt reading answers from `input` and writing questions to `output`
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Asks for the symbol list; an empty answer uses [`DEFAULT_SYMBOLS`]
    pub fn symbols(&mut self) -> Result<Vec<String>, CliError> {
        let answer = self.ask(&format!("Choose stock symbols ({}): ", DEFAULT_SYMBOLS))?;
        let answer = if answer.trim().is_empty() {
            DEFAULT_SYMBOLS.to_string()
        } else {
            answer
        };
        Ok(parse_symbols(&answer))
    }

    /// Shows the mode menu and reads the choice
    pub fn mode(&mut self) -> Result<FetchMode, CliError> {
        writeln!(self.output, "Choose fetch mode:")?;
        for (i, (label, _)) in MODE_CHOICES.iter().enumerate() {
            writeln!(self.output, "  {}) {}", i + 1, label)?;
        }
        let answer = self.ask("Mode [2]: ")?;
        parse_mode_choice(&answer)
    }

    fn ask(&mut self, question: &str) -> Result<String, CliError> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;
        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(answer)
    }
}

/// Renders quotes as a pretty-printed JSON object of symbol to price
pub fn render_prices(quotes: &[PriceQuote]) -> serde_json::Result<String> {
    let map: BTreeMap<String, String> = to_price_map(quotes);
    serde_json::to_string_pretty(&map)
}
