//! Command-line arguments for the quote feed.
use clap::Parser;
use quote_common::net::FEED_PORT;
use quote_common::tickers::Ticker;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Address to accept queries on.
    #[clap(long, default_value_t = quote_common::net::addr("0.0.0.0", FEED_PORT))]
    pub bind: String,

    /// Milliseconds between quote updates.
    #[clap(long, default_value_t = 500)]
    pub update_ms: u64,

    /// Ticker to publish; may be repeated. Publishes every known ticker when omitted.
    #[clap(long = "ticker", value_enum)]
    pub tickers: Vec<Ticker>,
}
