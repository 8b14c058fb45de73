//! Quote feed server.
//!
//! This binary publishes synthetic best bid/ask quotes for a set of tickers and answers
//! polling queries over TCP. It wires together two building blocks:
//!
//! - `QuoteGenerator` — refreshes the latest quote of every ticker in a shared
//!   `QuoteBook` on a fixed cadence.
//! - `QueryReceiver` — accepts TCP connections, reads one `QUERY` command per connection
//!   and replies with the book's current quotes for the requested tickers as JSON.
//!
//! The book only holds the latest quote per ticker, so two queries between generator
//! updates return identical quotes. Clients are expected to deduplicate by timestamp.
//!
//! Shutdown: Ctrl+C stops the generator; the process then exits, dropping the listener.
#![warn(missing_docs)]
use crate::args::Args;
use crate::generator::{QuoteBook, QuoteGenerator};
use crate::receiver::QueryReceiver;
use clap::Parser;
use crossbeam_channel::bounded;
use env_logger::{Builder, Env};
use log::{LevelFilter, error, info};
use quote_common::Result;
use quote_common::StreamError;
use quote_common::tickers::Ticker;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

mod args;
mod generator;
mod receiver;

fn main() -> Result<(), StreamError> {
    init_logger();
    let args = Args::parse();
    if args.update_ms == 0 {
        return Err(StreamError::Format(String::from(
            "update interval must be greater than zero",
        )));
    }

    let tickers = if args.tickers.is_empty() {
        Ticker::ALL.to_vec()
    } else {
        args.tickers.clone()
    };
    info!("Publishing {:?}", tickers);

    let book = Arc::new(Mutex::new(QuoteBook::new()));
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    {
        let shutdown_tx = shutdown_tx.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down feed...");
            let _ = shutdown_tx.try_send(());
        })
        .map_err(|e| StreamError::Format(format!("cannot install Ctrl+C handler: {}", e)))?;
    }

    let generator = QuoteGenerator::start(
        Arc::clone(&book),
        tickers,
        Duration::from_millis(args.update_ms),
        shutdown_rx,
    );

    let receiver = QueryReceiver::new(&args.bind)?;
    info!("Accepting queries on {}", receiver.local_addr()?);
    let receiver_book = Arc::clone(&book);
    thread::spawn(move || {
        if let Err(e) = receiver.serve(receiver_book) {
            error!("Receiver loop failed: {:?}", e);
        }
    });

    if generator.join().is_err() {
        error!("Market generator panicked");
    }
    drop(shutdown_tx);
    info!("Quote feed stopped");
    Ok(())
}

fn init_logger() {
    logger_builder(Env::default()).init();
}

/// `Info` unless `env` names other filters (`RUST_LOG` by default).
fn logger_builder(env: Env) -> Builder {
    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info).parse_env(env);
    builder
}
