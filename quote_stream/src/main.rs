//! Quote Stream — polls the quote feed, deduplicates quotes by timestamp and appends the
//! new ones to an in-memory chart table, logging the chart as it grows.
//!
//! Usage example (CLI):
//! ```bash
//! quote_stream --feed-addr 127.0.0.1:8080 --interval-ms 100 --ticker aapl --ticker msft
//! quote_stream --replay ./recorded.jsonl --duration-secs 5
//! ```
//!
//! The ticker file should contain symbols separated by commas, spaces, or new lines.
//! See `quote_common::tickers` for details.
#![warn(missing_docs)]
mod args;

use crate::args::Args;
use clap::Parser;
use log::{info, warn};
use quote_common::Result;
use quote_common::StreamError;
use quote_common::tickers::{Ticker, TickerParser};
use quote_stream::{
    MemoryTable, Pipeline, QuoteSource, ScriptedSource, StreamConfig, TcpFeedSource,
};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

/// How often the main loop checks for shutdown.
const WAIT_STEP: Duration = Duration::from_millis(250);
/// How often the chart summary is logged.
const REPORT_EVERY: Duration = Duration::from_secs(1);

fn main() -> Result<(), StreamError> {
    init_logger();
    let args = Args::parse();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Stopping stream...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .map_err(|e| StreamError::Format(format!("cannot install Ctrl+C handler: {}", e)))?;
    }

    let config = StreamConfig::from_millis(args.interval_ms, args.strictness)?;
    let source = build_source(&args)?;
    let table = MemoryTable::shared();
    let mut pipeline = Pipeline::new(source, Arc::clone(&table), config)?;

    pipeline.start_streaming(config.interval)?;
    info!(
        "Streaming every {:?} ({} timestamps). Press Ctrl+C to exit.",
        config.interval, config.strictness
    );

    let deadline = args
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut last_report = Instant::now();

    while !shutdown.load(Ordering::Relaxed) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            info!("Run time elapsed.");
            break;
        }
        thread::sleep(WAIT_STEP);
        if last_report.elapsed() >= REPORT_EVERY {
            log_chart(&table)?;
            last_report = Instant::now();
        }
    }

    pipeline.stop_streaming();
    log_chart(&table)?;
    let stats = pipeline.stats()?;
    info!(
        "Delivered {} rows in {} batches; dropped {} stale, {} malformed ({} reported); \
         {} sink failures; {} failed pulls, {} skipped ticks",
        stats.rows_delivered,
        stats.batches,
        stats.stale_dropped,
        stats.malformed_dropped,
        stats.record_errors,
        stats.sink_failures,
        stats.poller.failed,
        stats.poller.skipped
    );
    Ok(())
}

fn build_source(args: &Args) -> Result<Box<dyn QuoteSource>> {
    if let Some(replay) = &args.replay {
        let file = File::open(normalize_path(replay))?;
        let source = ScriptedSource::from_reader(BufReader::new(file))?;
        info!("Replaying {} recorded batches from {}", source.remaining(), replay);
        return Ok(Box::new(source));
    }

    let mut tickers = args.tickers.clone();
    if let Some(path) = &args.path {
        let path = normalize_path(path);
        if !is_file_exist(&path) {
            return Err(StreamError::ParseTickersFile(format!(
                "{} is not a file",
                path.display()
            )));
        }
        for ticker in Ticker::parse_from_file(BufReader::new(File::open(path)?))? {
            if !tickers.contains(&ticker) {
                tickers.push(ticker);
            }
        }
    }
    if tickers.is_empty() {
        warn!("No tickers given, requesting every ticker the feed publishes");
    } else {
        info!("Tickers: {:?}", tickers);
    }

    let source = TcpFeedSource::new(&args.feed_addr, tickers)?;
    info!("Polling quote feed at {}", source.addr());
    Ok(Box::new(source))
}

fn log_chart(table: &Arc<Mutex<MemoryTable>>) -> Result<()> {
    let table = table.lock()?;
    match table.latest() {
        Some(point) => info!(
            "CHART: {} rows, {} stocks, last {} ask={:.2} bid={:.2}",
            table.row_count(),
            table.distinct_stocks(),
            point.timestamp,
            point.avg_top_ask,
            point.avg_top_bid
        ),
        None => info!("CHART: no rows yet"),
    }
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Normalize a CLI-provided path string by trimming whitespace and matching quotes.
///
/// This allows passing Windows paths in quotes without breaking parsing.
fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let no_quotes = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    PathBuf::from(no_quotes)
}

/// Returns `true` if the provided path exists and is a regular file.
fn is_file_exist(path: &PathBuf) -> bool {
    path.exists() && path.is_file()
}
