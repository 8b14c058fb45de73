//! Quote book and background quote generator.
//!
//! The `QuoteGenerator` runs a background thread that walks a mid price for each ticker
//! and writes a fresh best bid/ask into the shared `QuoteBook` on every round. Queries
//! read the book, so a client that polls faster than the generator ticks gets the same
//! quotes back more than once.
//!
//! Design notes:
//! - Uses a small random walk around the last mid price to simulate movement.
//! - Now and then one side of the book is left empty, as real feeds do when a side
//!   has no resting orders.

use chrono::{NaiveDateTime, Utc};
use crossbeam_channel::{Receiver, select, tick};
use log::{error, info};
use quote_common::{QuoteRecord, QuoteSide};
use quote_common::tickers::Ticker;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Mid price every ticker starts from.
pub const INITIAL_PRICE: f64 = 100.0;

/// Chance that a generated quote leaves one side empty.
const EMPTY_SIDE_PROBABILITY: f64 = 0.05;

/// Latest quote per ticker.
#[derive(Debug, Default)]
pub struct QuoteBook {
    quotes: BTreeMap<Ticker, QuoteRecord>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the quote for `ticker`.
    pub fn update(&mut self, ticker: Ticker, quote: QuoteRecord) {
        self.quotes.insert(ticker, quote);
    }

    /// Latest quotes for `tickers` (every ticker when empty), in ticker order.
    /// Tickers that have not been quoted yet are left out.
    pub fn snapshot(&self, tickers: &[Ticker]) -> Vec<QuoteRecord> {
        self.quotes
            .iter()
            .filter(|(ticker, _)| tickers.is_empty() || tickers.contains(*ticker))
            .map(|(_, quote)| quote.clone())
            .collect()
    }
}

/// Background market data generator that writes into a `QuoteBook`.
pub struct QuoteGenerator;

impl QuoteGenerator {
    /// Calculate the next synthetic mid price using a small random walk around `current_price`.
    ///
    /// The change is sampled uniformly from the range `[-1%, +1%]` and the result is
    /// clamped to a minimum positive value to avoid non-sensical zero/negative prices.
    pub fn next_price(current_price: f64) -> f64 {
        let mut rng = rand::rng();
        let change: f64 = rng.random_range(-0.01..0.01);
        let new_price = current_price * (1.0 + change);
        new_price.max(0.01)
    }

    /// Builds a quote around `mid`: the ask sits above it and the bid below it.
    pub fn quote_around(ticker: Ticker, mid: f64, timestamp: NaiveDateTime) -> QuoteRecord {
        let mut rng = rand::rng();
        let half_spread = mid * rng.random_range(0.0005..0.005);
        let mut quote = QuoteRecord::new(&ticker.to_string(), timestamp)
            .with_ask(mid + half_spread, rng.random_range(1..200))
            .with_bid((mid - half_spread).max(0.01), rng.random_range(1..200));

        if rng.random_bool(EMPTY_SIDE_PROBABILITY) {
            if rng.random_bool(0.5) {
                quote.top_ask = QuoteSide::Absent;
            } else {
                quote.top_bid = QuoteSide::Absent;
            }
        }
        quote
    }

    /// Start the generator thread. It stops when `shutdown_rx` receives or disconnects.
    pub fn start(
        book: Arc<Mutex<QuoteBook>>,
        tickers: Vec<Ticker>,
        interval: Duration,
        shutdown_rx: Receiver<()>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut mids: HashMap<Ticker, f64> =
                tickers.iter().map(|t| (*t, INITIAL_PRICE)).collect();
            let ticker_rx = tick(interval);

            info!(
                "Market generator started for {} tickers (Thread ID: {:?})",
                tickers.len(),
                thread::current().id()
            );

            loop {
                select! {
                    recv(shutdown_rx) -> _ => break,
                    recv(ticker_rx) -> _ => {
                        let mut book = match book.lock() {
                            Ok(book) => book,
                            Err(e) => {
                                error!("Quote book lock poisoned: {}", e);
                                break;
                            }
                        };
                        for ticker in &tickers {
                            let mid = Self::next_price(*mids.get(ticker).unwrap_or(&INITIAL_PRICE));
                            mids.insert(*ticker, mid);
                            book.update(*ticker, Self::quote_around(*ticker, mid, Utc::now().naive_utc()));
                        }
                    },
                }
            }
            info!("Market generator stopping...");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use crossbeam_channel::bounded;

    fn ts(secs: i64) -> NaiveDateTime {
        DateTime::from_timestamp(secs, 0).unwrap().naive_utc()
    }

    #[test]
    fn next_price_stays_within_one_percent() {
        for _ in 0..1000 {
            let price = QuoteGenerator::next_price(100.0);
            assert!((99.0..=101.0).contains(&price));
        }
    }

    #[test]
    fn ask_is_never_below_bid() {
        for _ in 0..1000 {
            let quote = QuoteGenerator::quote_around(Ticker::AAPL, 50.0, ts(1));
            assert_eq!(quote.stock, "AAPL");
            if let (Some(ask), Some(bid)) = (quote.top_ask.price(), quote.top_bid.price()) {
                assert!(ask > bid);
            }
        }
    }

    #[test]
    fn snapshot_filters_by_ticker() {
        let mut book = QuoteBook::new();
        book.update(Ticker::MSFT, QuoteRecord::new("MSFT", ts(2)));
        book.update(Ticker::AAPL, QuoteRecord::new("AAPL", ts(1)));
        book.update(Ticker::AAPL, QuoteRecord::new("AAPL", ts(3)));

        let all = book.snapshot(&[]);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_time().unwrap(), ts(3));

        let msft = book.snapshot(&[Ticker::MSFT, Ticker::IBM]);
        assert_eq!(msft, vec![QuoteRecord::new("MSFT", ts(2))]);
    }

    #[test]
    fn generator_fills_the_book_and_stops() {
        let book = Arc::new(Mutex::new(QuoteBook::new()));
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let handle = QuoteGenerator::start(
            Arc::clone(&book),
            vec![Ticker::AAPL, Ticker::TSLA],
            Duration::from_millis(5),
            shutdown_rx,
        );

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while book.lock().unwrap().snapshot(&[]).len() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        shutdown_tx.send(()).unwrap();
        handle.join().unwrap();

        let quotes = book.lock().unwrap().snapshot(&[]);
        assert_eq!(quotes.len(), 2);
        assert!(quotes.iter().all(|q| q.validate().is_ok()));
    }
}
