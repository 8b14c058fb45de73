//! Column-oriented batches and the record-to-column transformer.
//!
//! The chart engine consumes data as parallel per-field columns rather than rows. Its
//! schema is fixed when the table is created:
//!
//! | column          | type     |
//! |-----------------|----------|
//! | `stock`         | `string` |
//! | `top_ask_price` | `float`  |
//! | `top_bid_price` | `float`  |
//! | `timestamp`     | `date`   |
//!
//! [`to_columns`] is the only place where an absent book side turns into a `0` price.

use chrono::NaiveDateTime;
use log::warn;
use quote_common::{QuoteRecord, StreamError};
use serde::Serialize;
use strum::Display;

/// Name of the symbol column.
pub const STOCK: &str = "stock";
/// Name of the best ask price column.
pub const TOP_ASK_PRICE: &str = "top_ask_price";
/// Name of the best bid price column.
pub const TOP_BID_PRICE: &str = "top_bid_price";
/// Name of the timestamp column.
pub const TIMESTAMP: &str = "timestamp";

/// Price reported for a side the feed did not quote.
pub const MISSING_PRICE: f64 = 0.0;

/// Value type of a sink column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ColumnType {
    String,
    Float,
    Date,
}

/// Ordered column names and types a sink table is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<(&'static str, ColumnType)>,
}

impl Schema {
    /// The quote chart schema.
    pub fn quotes() -> Self {
        Schema {
            columns: vec![
                (STOCK, ColumnType::String),
                (TOP_ASK_PRICE, ColumnType::Float),
                (TOP_BID_PRICE, ColumnType::Float),
                (TIMESTAMP, ColumnType::Date),
            ],
        }
    }

    /// Column names and types, in order.
    pub fn columns(&self) -> &[(&'static str, ColumnType)] {
        &self.columns
    }

    /// Type of the column called `name`.
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, kind)| *kind)
    }
}

/// Borrowed view of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnValues<'a> {
    /// A `string` column.
    Strings(&'a [String]),
    /// A `float` column.
    Floats(&'a [f64]),
    /// A `date` column.
    Dates(&'a [NaiveDateTime]),
}

impl ColumnValues<'_> {
    /// Type of the borrowed column.
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValues::Strings(_) => ColumnType::String,
            ColumnValues::Floats(_) => ColumnType::Float,
            ColumnValues::Dates(_) => ColumnType::Date,
        }
    }

    /// Number of values in the column.
    pub fn value_count(&self) -> usize {
        match self {
            ColumnValues::Strings(values) => values.len(),
            ColumnValues::Floats(values) => values.len(),
            ColumnValues::Dates(values) => values.len(),
        }
    }
}

/// One row of a [`ColumnBatch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row<'a> {
    pub stock: &'a str,
    pub top_ask_price: f64,
    pub top_bid_price: f64,
    pub timestamp: NaiveDateTime,
}

/// Parallel columns handed to the sink. Row `i` of every column belongs to the same
/// source record.
///
/// Serializes as `{"stock": [...], "top_ask_price": [...], ...}`, the object-of-arrays
/// form chart tables accept on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnBatch {
    /// Symbols.
    pub stock: Vec<String>,
    /// Best ask prices, `0` where the ask was absent.
    pub top_ask_price: Vec<f64>,
    /// Best bid prices, `0` where the bid was absent.
    pub top_bid_price: Vec<f64>,
    /// Observation times.
    pub timestamp: Vec<NaiveDateTime>,
}

impl ColumnBatch {
    /// Creates an empty batch with room for `rows` rows.
    pub fn with_capacity(rows: usize) -> Self {
        ColumnBatch {
            stock: Vec::with_capacity(rows),
            top_ask_price: Vec::with_capacity(rows),
            top_bid_price: Vec::with_capacity(rows),
            timestamp: Vec::with_capacity(rows),
        }
    }

    /// Number of rows. Only meaningful when [`Self::is_aligned`] holds.
    pub fn len(&self) -> usize {
        self.stock.len()
    }

    /// `true` when the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` when every column has the same length.
    pub fn is_aligned(&self) -> bool {
        let rows = self.stock.len();
        self.top_ask_price.len() == rows
            && self.top_bid_price.len() == rows
            && self.timestamp.len() == rows
    }

    /// Borrows the column called `name`.
    pub fn column(&self, name: &str) -> Option<ColumnValues<'_>> {
        match name {
            STOCK => Some(ColumnValues::Strings(&self.stock)),
            TOP_ASK_PRICE => Some(ColumnValues::Floats(&self.top_ask_price)),
            TOP_BID_PRICE => Some(ColumnValues::Floats(&self.top_bid_price)),
            TIMESTAMP => Some(ColumnValues::Dates(&self.timestamp)),
            _ => None,
        }
    }

    /// Checks that the batch carries exactly the schema's columns with matching types
    /// and equal lengths.
    pub fn conforms_to(&self, schema: &Schema) -> Result<(), StreamError> {
        if schema.columns().len() != 4 {
            return Err(StreamError::Sink(format!(
                "schema has {} columns, quote batches have 4",
                schema.columns().len()
            )));
        }
        for (name, expected) in schema.columns() {
            let values = self
                .column(name)
                .ok_or_else(|| StreamError::Sink(format!("batch has no column {}", name)))?;
            if values.column_type() != *expected {
                return Err(StreamError::Sink(format!(
                    "column {} is {}, schema expects {}",
                    name,
                    values.column_type(),
                    expected
                )));
            }
            if values.value_count() != self.len() {
                return Err(StreamError::Sink(format!(
                    "column {} has {} values, {} has {}",
                    name,
                    values.value_count(),
                    STOCK,
                    self.len()
                )));
            }
        }
        Ok(())
    }

    /// Iterates rows. The batch must be aligned.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        debug_assert!(self.is_aligned());
        (0..self.len()).map(move |i| Row {
            stock: &self.stock[i],
            top_ask_price: self.top_ask_price[i],
            top_bid_price: self.top_bid_price[i],
            timestamp: self.timestamp[i],
        })
    }

    /// Appends all rows of `other`.
    pub fn extend_from(&mut self, other: &ColumnBatch) {
        self.stock.extend_from_slice(&other.stock);
        self.top_ask_price.extend_from_slice(&other.top_ask_price);
        self.top_bid_price.extend_from_slice(&other.top_bid_price);
        self.timestamp.extend_from_slice(&other.timestamp);
    }

    fn push(&mut self, stock: &str, ask: f64, bid: f64, timestamp: NaiveDateTime) {
        self.stock.push(String::from(stock));
        self.top_ask_price.push(ask);
        self.top_bid_price.push(bid);
        self.timestamp.push(timestamp);
    }
}

/// Result of [`to_columns`]: the batch built from every valid record, plus one error per
/// record that was left out.
#[derive(Debug, Default)]
pub struct Conversion {
    /// Columns built from the valid records.
    pub batch: ColumnBatch,
    /// One error per record left out.
    pub rejected: Vec<StreamError>,
}

/// Reshapes records into columns, preserving their order.
///
/// A record without a `stock` or with an unreadable `timestamp` is left out and reported
/// in [`Conversion::rejected`]; the remaining records are still converted.
pub fn to_columns(records: &[QuoteRecord]) -> Conversion {
    let mut conversion = Conversion {
        batch: ColumnBatch::with_capacity(records.len()),
        rejected: Vec::new(),
    };

    for record in records {
        match record.validate() {
            Ok(timestamp) => conversion.batch.push(
                &record.stock,
                record.top_ask.price().unwrap_or(MISSING_PRICE),
                record.top_bid.price().unwrap_or(MISSING_PRICE),
                timestamp,
            ),
            Err(e) => {
                warn!("Dropping record during column conversion: {}", e);
                conversion.rejected.push(e);
            }
        }
    }
    conversion
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use quote_common::QuoteSide;

    fn ts(secs: i64) -> NaiveDateTime {
        DateTime::from_timestamp(secs, 0).unwrap().naive_utc()
    }

    #[test]
    fn present_sides_keep_exact_prices() {
        let records = vec![QuoteRecord::new("AAPL", ts(1)).with_ask(101.37, 5).with_bid(100.91, 7)];
        let batch = to_columns(&records).batch;

        assert_eq!(batch.top_ask_price, vec![101.37]);
        assert_eq!(batch.top_bid_price, vec![100.91]);
    }

    #[test]
    fn absent_sides_default_to_zero() {
        let records = vec![
            QuoteRecord::new("AAPL", ts(1)).with_ask(100.0, 1),
            QuoteRecord::new("MSFT", ts(2)).with_bid(50.0, 1),
            QuoteRecord::new("IBM", ts(3)),
        ];
        let batch = to_columns(&records).batch;

        assert_eq!(batch.top_ask_price, vec![100.0, 0.0, 0.0]);
        assert_eq!(batch.top_bid_price, vec![0.0, 50.0, 0.0]);
    }

    #[test]
    fn rows_line_up_with_input_order() {
        let records: Vec<QuoteRecord> = (0..20)
            .map(|i| {
                QuoteRecord::new(&format!("S{}", i), ts(100 - i))
                    .with_ask(i as f64, 1)
                    .with_bid(-(i as f64), 1)
            })
            .collect();
        let conversion = to_columns(&records);
        let batch = conversion.batch;

        assert!(conversion.rejected.is_empty());
        assert!(batch.is_aligned());
        assert_eq!(batch.len(), records.len());
        for (i, row) in batch.rows().enumerate() {
            assert_eq!(row.stock, records[i].stock);
            assert_eq!(row.top_ask_price, i as f64);
            assert_eq!(row.top_bid_price, -(i as f64));
            assert_eq!(row.timestamp, ts(100 - i as i64));
        }
    }

    #[test]
    fn empty_input_gives_empty_aligned_batch() {
        let batch = to_columns(&[]).batch;
        assert!(batch.is_empty());
        assert!(batch.is_aligned());
        assert!(batch.conforms_to(&Schema::quotes()).is_ok());
    }

    #[test]
    fn missing_required_fields_drop_only_that_record() {
        let mut no_stock = QuoteRecord::new("", ts(2));
        no_stock.top_ask = QuoteSide::Present { price: 1.0, size: 1 };
        let mut bad_time = QuoteRecord::new("MSFT", ts(3));
        bad_time.timestamp = String::from("not a time");

        let records = vec![
            QuoteRecord::new("AAPL", ts(1)),
            no_stock,
            bad_time,
            QuoteRecord::new("IBM", ts(4)),
        ];
        let conversion = to_columns(&records);

        assert_eq!(conversion.batch.stock, vec!["AAPL", "IBM"]);
        assert_eq!(conversion.batch.timestamp, vec![ts(1), ts(4)]);
        assert_eq!(conversion.rejected.len(), 2);
        assert!(conversion.rejected.iter().all(StreamError::is_record_level));
    }

    #[test]
    fn batch_matches_quote_schema() {
        let batch = to_columns(&[QuoteRecord::new("AAPL", ts(1))]).batch;
        let schema = Schema::quotes();

        assert!(batch.conforms_to(&schema).is_ok());
        assert_eq!(schema.column_type(TIMESTAMP), Some(ColumnType::Date));
        assert_eq!(ColumnType::Float.to_string(), "float");
    }

    #[test]
    fn misaligned_batch_does_not_conform() {
        let mut batch = to_columns(&[QuoteRecord::new("AAPL", ts(1))]).batch;
        batch.top_bid_price.push(3.0);
        assert!(matches!(
            batch.conforms_to(&Schema::quotes()),
            Err(StreamError::Sink(_))
        ));
    }

    #[test]
    fn serializes_as_object_of_arrays() {
        let batch = to_columns(&[QuoteRecord::new("AAPL", ts(0)).with_ask(2.5, 1)]).batch;
        let value = serde_json::to_value(&batch).unwrap();

        assert_eq!(value[STOCK][0], "AAPL");
        assert_eq!(value[TOP_ASK_PRICE][0], 2.5);
        assert_eq!(value[TOP_BID_PRICE][0], 0.0);
        assert_eq!(value[TIMESTAMP][0], "1970-01-01T00:00:00");
    }
}
