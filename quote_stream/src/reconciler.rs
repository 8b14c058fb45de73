//! High-water-mark deduplication.
//!
//! The feed answers every poll with its latest snapshot, so the same quote usually comes
//! back several times and late quotes can arrive after newer ones. The sink appends
//! whatever it is given and cannot tell a repeat from a new row, so the `Reconciler` only
//! lets a record through when its timestamp is strictly greater than every timestamp
//! accepted before it.
//!
//! The mark is shared by all symbols: a fresh `MSFT` quote older than the last accepted
//! `AAPL` quote is dropped, even when it is the newest `MSFT` quote seen so far.

use chrono::NaiveDateTime;
use clap::ValueEnum;
use log::{debug, error, warn};
use quote_common::{QuoteRecord, StreamError};
use strum::Display;

/// What to do with a record whose timestamp cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Display)]
#[clap(rename_all = "lower")]
#[strum(serialize_all = "lowercase")]
pub enum Strictness {
    /// Drop the record with a warning and keep going.
    #[default]
    Skip,
    /// Drop the record and report it as an error for the tick that carried it.
    Strict,
}

/// Outcome of reconciling one batch.
#[derive(Debug, Default)]
pub struct Reconciled {
    /// Records that passed, in input order.
    pub accepted: Vec<QuoteRecord>,
    /// Records at or before the mark.
    pub stale: usize,
    /// One error per record skipped because its timestamp could not be read.
    pub malformed: Vec<StreamError>,
}

/// Strictly-increasing timestamp filter.
#[derive(Debug, Clone)]
pub struct Reconciler {
    last_accepted: Option<NaiveDateTime>,
    strictness: Strictness,
}

impl Reconciler {
    /// Creates a reconciler that has not accepted anything yet.
    pub fn new(strictness: Strictness) -> Self {
        Self {
            last_accepted: None,
            strictness,
        }
    }

    /// Creates a reconciler that only accepts records newer than `mark`.
    pub fn with_mark(mark: NaiveDateTime, strictness: Strictness) -> Self {
        Self {
            last_accepted: Some(mark),
            strictness,
        }
    }

    /// The newest accepted timestamp, if any.
    pub fn last_accepted(&self) -> Option<NaiveDateTime> {
        self.last_accepted
    }

    /// How unreadable timestamps are reported.
    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    /// Forgets the mark. Only used when the pipeline is explicitly restarted.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }

    /// Filters `batch` against the mark, advancing it for every accepted record.
    ///
    /// A record with an unreadable timestamp never stops the rest of the batch: it is
    /// left out and its error lands in [`Reconciled::malformed`]. In
    /// [`Strictness::Strict`] mode it is also logged at `error` level.
    pub fn accept(&mut self, batch: Vec<QuoteRecord>) -> Reconciled {
        let mut reconciled = Reconciled {
            accepted: Vec::with_capacity(batch.len()),
            ..Reconciled::default()
        };

        for record in batch {
            let time = match record.event_time() {
                Ok(time) => time,
                Err(e) => {
                    let e = StreamError::MalformedRecord(format!(
                        "{} in record for {:?}",
                        e, record.stock
                    ));
                    match self.strictness {
                        Strictness::Skip => warn!("Skipping record: {}", e),
                        Strictness::Strict => error!("Rejected record: {}", e),
                    }
                    reconciled.malformed.push(e);
                    continue;
                }
            };

            if self.last_accepted.is_none_or(|mark| time > mark) {
                self.last_accepted = Some(time);
                reconciled.accepted.push(record);
            } else {
                reconciled.stale += 1;
            }
        }

        if reconciled.stale > 0 {
            debug!(
                "Dropped {} stale record(s); mark is {:?}",
                reconciled.stale, self.last_accepted
            );
        }
        reconciled
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Strictness::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn ts(secs: i64) -> NaiveDateTime {
        DateTime::from_timestamp(secs, 0).unwrap().naive_utc()
    }

    fn quote(stock: &str, secs: i64) -> QuoteRecord {
        QuoteRecord::new(stock, ts(secs))
    }

    fn times(records: &[QuoteRecord]) -> Vec<NaiveDateTime> {
        records.iter().map(|r| r.event_time().unwrap()).collect()
    }

    #[test]
    fn increasing_timestamps_are_all_accepted_in_order() {
        let mut reconciler = Reconciler::default();
        let batch: Vec<QuoteRecord> = (1..=10).map(|s| quote("AAPL", s * 3)).collect();

        let result = reconciler.accept(batch.clone());

        assert_eq!(result.accepted, batch);
        assert_eq!(result.stale, 0);
        assert_eq!(reconciler.last_accepted(), Some(ts(30)));
    }

    #[test]
    fn nothing_at_or_before_the_mark_is_accepted() {
        let mut reconciler = Reconciler::with_mark(ts(50), Strictness::Skip);
        let batch = vec![quote("AAPL", 50), quote("MSFT", 10), quote("AAPL", 49)];

        let result = reconciler.accept(batch);

        assert!(result.accepted.is_empty());
        assert_eq!(result.stale, 3);
        assert_eq!(reconciler.last_accepted(), Some(ts(50)));
    }

    #[test]
    fn refeeding_an_accepted_batch_yields_nothing() {
        let mut reconciler = Reconciler::default();
        let batch = vec![quote("AAPL", 1), quote("MSFT", 2), quote("AAPL", 3)];

        assert_eq!(reconciler.accept(batch.clone()).accepted.len(), 3);
        let again = reconciler.accept(batch);
        assert!(again.accepted.is_empty());
        assert_eq!(again.stale, 3);
    }

    #[test]
    fn out_of_order_record_is_dropped_within_a_batch() {
        let mut reconciler = Reconciler::default();
        let batch = vec![
            quote("AAPL", 1).with_ask(100.0, 1),
            quote("AAPL", 0).with_ask(99.0, 1),
            quote("AAPL", 2).with_ask(101.0, 1),
        ];

        let result = reconciler.accept(batch);

        assert_eq!(times(&result.accepted), vec![ts(1), ts(2)]);
        assert_eq!(result.stale, 1);
    }

    #[test]
    fn mark_is_shared_across_symbols() {
        let mut reconciler = Reconciler::default();
        reconciler.accept(vec![quote("AAPL", 10)]);

        let result = reconciler.accept(vec![quote("MSFT", 9), quote("MSFT", 11)]);

        assert_eq!(times(&result.accepted), vec![ts(11)]);
    }

    #[test]
    fn equal_timestamps_in_one_batch_keep_only_the_first() {
        let mut reconciler = Reconciler::default();
        let result = reconciler
            .accept(vec![quote("AAPL", 5), quote("MSFT", 5)]);

        assert_eq!(result.accepted.len(), 1);
        assert_eq!(result.accepted[0].stock, "AAPL");
    }

    #[test]
    fn malformed_timestamp_is_skipped_by_default() {
        let mut reconciler = Reconciler::default();
        let mut broken = quote("MSFT", 2);
        broken.timestamp = String::from("??");

        let result = reconciler
            .accept(vec![quote("AAPL", 1), broken, quote("AAPL", 3)]);

        assert_eq!(times(&result.accepted), vec![ts(1), ts(3)]);
        assert_eq!(result.malformed.len(), 1);
    }

    #[test]
    fn strict_mode_reports_bad_records_and_keeps_the_rest() {
        let mut reconciler = Reconciler::with_mark(ts(1), Strictness::Strict);
        let mut broken = quote("MSFT", 3);
        broken.timestamp.clear();

        let result = reconciler.accept(vec![quote("AAPL", 2), broken, quote("AAPL", 4)]);

        assert_eq!(times(&result.accepted), vec![ts(2), ts(4)]);
        assert_eq!(result.malformed.len(), 1);
        assert!(result.malformed[0].is_record_level());
        assert_eq!(reconciler.last_accepted(), Some(ts(4)));
    }

    #[test]
    fn a_symbol_with_a_bad_timestamp_does_not_block_the_others() {
        let mut reconciler = Reconciler::new(Strictness::Strict);

        for tick in 1..=3 {
            let mut broken = quote("MSFT", tick);
            broken.timestamp = String::from("x");
            let result = reconciler.accept(vec![quote("AAPL", tick), broken]);

            assert_eq!(times(&result.accepted), vec![ts(tick)]);
            assert_eq!(result.malformed.len(), 1);
        }
        assert_eq!(reconciler.last_accepted(), Some(ts(3)));
        assert_eq!(reconciler.strictness(), Strictness::Strict);
    }

    #[test]
    fn reset_forgets_the_mark() {
        let mut reconciler = Reconciler::default();
        reconciler.accept(vec![quote("AAPL", 7)]);
        reconciler.reset();

        assert_eq!(reconciler.last_accepted(), None);
        assert_eq!(reconciler.accept(vec![quote("AAPL", 7)]).accepted.len(), 1);
    }
}
