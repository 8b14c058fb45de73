//! Command-line arguments for the streaming client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;
use quote_common::net::{DEFAULT_FEED_HOST, FEED_PORT};
use quote_common::tickers::Ticker;
use quote_stream::Strictness;
use quote_stream::config::DEFAULT_INTERVAL_MS;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Quote feed address (host:port).
    #[clap(long, default_value_t = quote_common::net::addr(DEFAULT_FEED_HOST, FEED_PORT))]
    pub feed_addr: String,

    /// Milliseconds between polls.
    #[clap(long, default_value_t = DEFAULT_INTERVAL_MS)]
    pub interval_ms: u64,

    /// What to do with quotes whose timestamp cannot be read.
    #[clap(long, value_enum, default_value_t = Strictness::Skip)]
    pub strictness: Strictness,

    /// Ticker to request; may be repeated. Combined with `--path`.
    #[clap(long = "ticker", value_enum)]
    pub tickers: Vec<Ticker>,

    /// Path to a text file with tickers to request.
    /// Tickers may be separated by commas, spaces, or new lines.
    #[clap(long)]
    pub path: Option<String>,

    /// Replay batches from a JSON-lines file instead of querying the feed.
    #[clap(long)]
    pub replay: Option<String>,

    /// Stop after this many seconds. Runs until Ctrl+C when omitted.
    #[clap(long)]
    pub duration_secs: Option<u64>,
}
