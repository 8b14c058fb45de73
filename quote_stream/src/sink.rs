//! Visualization sinks.
//!
//! A `ColumnSink` is created once with a fixed schema and then receives additive column
//! batches. It keeps no record of what it was sent beyond appending it, so every row it
//! gets counts towards its aggregates; the pipeline is what guarantees rows are new.
//!
//! `MemoryTable` is the in-process chart table: it stores every delivered row and keeps
//! the aggregate the quote chart plots (average ask and bid per timestamp).

use chrono::NaiveDateTime;
use log::debug;
use quote_common::{Result, StreamError};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::columns::{ColumnBatch, Schema};

/// Stateful consumer of column batches.
pub trait ColumnSink: Send {
    /// Creates the table. Called once before any update.
    fn load(&mut self, schema: &Schema) -> Result<()>;

    /// Appends `batch` and re-aggregates.
    fn update(&mut self, batch: &ColumnBatch) -> Result<()>;
}

impl<S: ColumnSink> ColumnSink for Arc<Mutex<S>> {
    fn load(&mut self, schema: &Schema) -> Result<()> {
        self.lock()?.load(schema)
    }

    fn update(&mut self, batch: &ColumnBatch) -> Result<()> {
        self.lock()?.update(batch)
    }
}

/// One plotted point: averages over every row sharing a timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    /// Shared timestamp of the averaged rows.
    pub timestamp: NaiveDateTime,
    /// Mean top ask, absent asks counting as `0`.
    pub avg_top_ask: f64,
    /// Mean top bid, absent bids counting as `0`.
    pub avg_top_bid: f64,
    /// Rows behind this point.
    pub rows: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    ask_sum: f64,
    bid_sum: f64,
    rows: usize,
}

impl Bucket {
    fn point(&self, timestamp: NaiveDateTime) -> ChartPoint {
        ChartPoint {
            timestamp,
            avg_top_ask: self.ask_sum / self.rows as f64,
            avg_top_bid: self.bid_sum / self.rows as f64,
            rows: self.rows,
        }
    }
}

/// Append-only in-memory chart table.
#[derive(Debug, Default)]
pub struct MemoryTable {
    schema: Option<Schema>,
    data: ColumnBatch,
    buckets: BTreeMap<NaiveDateTime, Bucket>,
    stocks: HashSet<String>,
    updates: usize,
}

impl MemoryTable {
    /// Creates an empty table with no schema loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a new table for sharing between the pipeline and an observer.
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// The schema given to `load`, if any.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Every row delivered so far.
    pub fn data(&self) -> &ColumnBatch {
        &self.data
    }

    /// Rows appended so far.
    pub fn row_count(&self) -> usize {
        self.data.len()
    }

    /// Number of accepted `update` calls.
    pub fn update_count(&self) -> usize {
        self.updates
    }

    /// Number of different stocks seen.
    pub fn distinct_stocks(&self) -> usize {
        self.stocks.len()
    }

    /// The plotted series, ordered by timestamp.
    pub fn chart(&self) -> Vec<ChartPoint> {
        self.buckets
            .iter()
            .map(|(timestamp, bucket)| bucket.point(*timestamp))
            .collect()
    }

    /// The point plotted at `timestamp`.
    pub fn point_at(&self, timestamp: &NaiveDateTime) -> Option<ChartPoint> {
        self.buckets
            .get(timestamp)
            .map(|bucket| bucket.point(*timestamp))
    }

    /// The most recent point.
    pub fn latest(&self) -> Option<ChartPoint> {
        self.buckets
            .iter()
            .next_back()
            .map(|(timestamp, bucket)| bucket.point(*timestamp))
    }
}

impl ColumnSink for MemoryTable {
    fn load(&mut self, schema: &Schema) -> Result<()> {
        match &self.schema {
            Some(loaded) if loaded != schema => Err(StreamError::Sink(String::from(
                "table already loaded with a different schema",
            ))),
            Some(_) => Ok(()),
            None => {
                self.schema = Some(schema.clone());
                Ok(())
            }
        }
    }

    fn update(&mut self, batch: &ColumnBatch) -> Result<()> {
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| StreamError::Sink(String::from("update before load")))?;
        batch.conforms_to(schema)?;

        for row in batch.rows() {
            let bucket = self.buckets.entry(row.timestamp).or_default();
            bucket.ask_sum += row.top_ask_price;
            bucket.bid_sum += row.top_bid_price;
            bucket.rows += 1;
            if !self.stocks.contains(row.stock) {
                self.stocks.insert(String::from(row.stock));
            }
        }
        self.data.extend_from(batch);
        self.updates += 1;

        debug!(
            "Table updated: +{} rows, {} total, {} stocks",
            batch.len(),
            self.data.len(),
            self.stocks.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::to_columns;
    use chrono::DateTime;
    use quote_common::QuoteRecord;

    fn ts(secs: i64) -> NaiveDateTime {
        DateTime::from_timestamp(secs, 0).unwrap().naive_utc()
    }

    fn batch(records: &[QuoteRecord]) -> ColumnBatch {
        to_columns(records).batch
    }

    #[test]
    fn update_before_load_is_rejected() {
        let mut table = MemoryTable::new();
        let err = table
            .update(&batch(&[QuoteRecord::new("AAPL", ts(1))]))
            .unwrap_err();
        assert!(matches!(err, StreamError::Sink(_)));
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn loading_the_same_schema_twice_is_fine() {
        let mut table = MemoryTable::new();
        table.load(&Schema::quotes()).unwrap();
        table.load(&Schema::quotes()).unwrap();
        assert_eq!(table.schema(), Some(&Schema::quotes()));
    }

    #[test]
    fn updates_append_and_aggregate_per_timestamp() {
        let mut table = MemoryTable::new();
        table.load(&Schema::quotes()).unwrap();

        table
            .update(&batch(&[
                QuoteRecord::new("AAPL", ts(1)).with_ask(100.0, 1).with_bid(98.0, 1),
                QuoteRecord::new("MSFT", ts(1)).with_ask(50.0, 1).with_bid(48.0, 1),
            ]))
            .unwrap();
        table
            .update(&batch(&[QuoteRecord::new("AAPL", ts(2)).with_ask(102.0, 1)]))
            .unwrap();

        assert_eq!(table.row_count(), 3);
        assert_eq!(table.update_count(), 2);
        assert_eq!(table.distinct_stocks(), 2);

        let first = table.point_at(&ts(1)).unwrap();
        assert_eq!(first.avg_top_ask, 75.0);
        assert_eq!(first.avg_top_bid, 73.0);
        assert_eq!(first.rows, 2);

        let latest = table.latest().unwrap();
        assert_eq!(latest.timestamp, ts(2));
        assert_eq!(latest.avg_top_bid, 0.0);
        assert_eq!(table.chart().len(), 2);
    }

    #[test]
    fn misaligned_batch_is_rejected_without_partial_append() {
        let mut table = MemoryTable::new();
        table.load(&Schema::quotes()).unwrap();

        let mut broken = batch(&[QuoteRecord::new("AAPL", ts(1))]);
        broken.stock.push(String::from("MSFT"));

        assert!(table.update(&broken).is_err());
        assert_eq!(table.row_count(), 0);
        assert!(table.chart().is_empty());
    }

    #[test]
    fn shared_table_is_a_sink() {
        let table = MemoryTable::shared();
        let mut sink = Arc::clone(&table);
        sink.load(&Schema::quotes()).unwrap();
        sink.update(&batch(&[QuoteRecord::new("AAPL", ts(1))])).unwrap();

        assert_eq!(table.lock().unwrap().row_count(), 1);
    }
}
