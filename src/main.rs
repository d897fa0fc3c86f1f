//! quotecache - Look up stock prices with a local cache
//!
//! Prompts for ticker symbols and a fetch mode (unless given as flags), serves
//! what it can from the cache file, fetches the rest, and prints a JSON object
//! of symbol to price on standard output.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::Parser;

use quotecache::cli::{render_prices, Cli, ProviderArg, Prompt, QuoteRequest};
use quotecache::config::Settings;
use quotecache::data::{MultiSymbolProvider, QuoteProvider, SingleSymbolProvider};
use quotecache::fetch::{FetchOptions, Fetcher};
use quotecache::report::TerminalReporter;

/// Sets up env_logger
///
/// Records go to standard error at `warn` and above, or to `log_file` at
/// `info` and above when one is configured. `RUST_LOG` overrides the level.
fn init_logger(log_file: Option<&Path>) -> io::Result<()> {
    let mut builder = env_logger::Builder::new();
    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .filter_level(log::LevelFilter::Info)
                .target(env_logger::Target::Pipe(Box::new(file)));
        }
        None => {
            builder.filter_level(log::LevelFilter::Warn);
        }
    }
    builder.parse_default_env().init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    init_logger(settings.log_file.as_deref())?;

    // Questions go to stderr so stdout only carries the result
    let mut prompt = Prompt::new(io::stdin().lock(), io::stderr());
    let request = match QuoteRequest::resolve(&cli, &mut prompt) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    let provider: Box<dyn QuoteProvider> = match request.provider {
        ProviderArg::Marketstack => {
            Box::new(MultiSymbolProvider::new(settings.marketstack_key.clone()))
        }
        ProviderArg::Finnhub => Box::new(SingleSymbolProvider::new(settings.finnhub_key.clone())),
    };
    let fetcher = Fetcher::new(settings.cache_store(), provider)
        .with_reporter(Arc::new(TerminalReporter::stderr()))
        .with_options(FetchOptions {
            failure_policy: request.failure_policy,
            ..settings.fetch_options()
        });

    let quotes = match (request.provider, request.symbols.as_slice()) {
        (ProviderArg::Finnhub, [symbol]) => fetcher.fetch_one(symbol, request.mode).await,
        _ => fetcher.fetch(&request.symbols, request.mode).await,
    };

    println!("{}", render_prices(&quotes)?);
    Ok(())
}
