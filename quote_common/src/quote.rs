//! Quote record model and timestamp helpers.
//!
//! A `QuoteRecord` is one observation for one symbol at one instant, exactly as the feed
//! reports it. Decoding is lenient so that one bad record never fails a whole batch:
//!
//! - a missing, `null` or non-string `stock` decodes to an empty string;
//! - a numeric `timestamp` is read as epoch milliseconds; any other non-string value is
//!   kept as its JSON text and fails to parse later;
//! - a missing, price-less or wrongly typed side decodes to `QuoteSide::Absent`.
//!
//! Validation then happens per record further down the pipeline.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

use crate::error::StreamError;

/// Format the feed writes timestamps in.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Accepted layouts for timestamp text, tried in order before RFC 3339.
const TIMESTAMP_LAYOUTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// One side of the book as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Best price on this side.
    #[serde(default)]
    pub price: Option<f64>,
    /// Quantity available at that price.
    #[serde(default)]
    pub size: Option<u64>,
}

/// Best quote on one side of the book, or nothing when the side is not currently known.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Option<PriceLevel>", into = "Option<PriceLevel>")]
pub enum QuoteSide {
    /// A known price level.
    Present {
        /// Best price.
        price: f64,
        /// Quantity at the best price.
        size: u64,
    },
    /// No quote on this side.
    #[default]
    Absent,
}

impl QuoteSide {
    /// Price of this side, if known.
    pub fn price(&self) -> Option<f64> {
        match self {
            QuoteSide::Present { price, .. } => Some(*price),
            QuoteSide::Absent => None,
        }
    }

}

impl From<Option<PriceLevel>> for QuoteSide {
    fn from(level: Option<PriceLevel>) -> Self {
        match level {
            Some(PriceLevel {
                price: Some(price),
                size,
            }) => QuoteSide::Present {
                price,
                size: size.unwrap_or(0),
            },
            _ => QuoteSide::Absent,
        }
    }
}

impl From<QuoteSide> for Option<PriceLevel> {
    fn from(side: QuoteSide) -> Self {
        match side {
            QuoteSide::Present { price, size } => Some(PriceLevel {
                price: Some(price),
                size: Some(size),
            }),
            QuoteSide::Absent => None,
        }
    }
}

/// Best bid/ask snapshot for a single symbol.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuoteRecord {
    /// Symbol identifier (e.g., `AAPL`). Empty when the feed omitted it.
    #[serde(default, deserialize_with = "lenient_stock")]
    pub stock: String,
    /// Best ask.
    #[serde(default, deserialize_with = "lenient_side")]
    pub top_ask: QuoteSide,
    /// Best bid.
    #[serde(default, deserialize_with = "lenient_side")]
    pub top_bid: QuoteSide,
    /// Observation time as sent by the feed. Empty when the feed omitted it.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: String,
}

fn lenient_stock<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(stock) => stock,
        _ => String::new(),
    })
}

fn lenient_side<'de, D: Deserializer<'de>>(deserializer: D) -> Result<QuoteSide, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        Value::Number(millis) => from_epoch_millis(&millis)
            .map(|at| format_timestamp(&at))
            .unwrap_or_else(|| millis.to_string()),
        other => other.to_string(),
    })
}

impl QuoteRecord {
    /// Creates a record with both sides absent.
    pub fn new(stock: &str, timestamp: NaiveDateTime) -> Self {
        QuoteRecord {
            stock: String::from(stock),
            top_ask: QuoteSide::Absent,
            top_bid: QuoteSide::Absent,
            timestamp: format_timestamp(&timestamp),
        }
    }

    /// Sets the best ask.
    pub fn with_ask(mut self, price: f64, size: u64) -> Self {
        self.top_ask = QuoteSide::Present { price, size };
        self
    }

    /// Sets the best bid.
    pub fn with_bid(mut self, price: f64, size: u64) -> Self {
        self.top_bid = QuoteSide::Present { price, size };
        self
    }

    /// Parses the observation time.
    pub fn event_time(&self) -> Result<NaiveDateTime, StreamError> {
        parse_timestamp(&self.timestamp)
    }

    /// Checks the required fields, returning the parsed observation time.
    pub fn validate(&self) -> Result<NaiveDateTime, StreamError> {
        if self.stock.trim().is_empty() {
            return Err(StreamError::MalformedRecord(format!(
                "missing stock (timestamp {:?})",
                self.timestamp
            )));
        }
        self.event_time()
    }
}

/// Renders a timestamp the way the feed does.
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Converts a numeric feed timestamp (milliseconds since the Unix epoch, UTC).
///
/// Returns `None` when the value is out of range.
pub fn from_epoch_millis(millis: &Number) -> Option<NaiveDateTime> {
    if let Some(millis) = millis.as_i64() {
        return DateTime::from_timestamp_millis(millis).map(|at| at.naive_utc());
    }
    let millis = millis.as_f64().filter(|m| m.is_finite())?;
    DateTime::from_timestamp_micros((millis * 1000.0).round() as i64).map(|at| at.naive_utc())
}

/// Parses feed timestamp text. RFC 3339 values are normalised to UTC.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, StreamError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(StreamError::MalformedRecord(String::from("missing timestamp")));
    }

    for layout in TIMESTAMP_LAYOUTS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, layout) {
            return Ok(parsed);
        }
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.naive_utc())
        .map_err(|e| StreamError::MalformedRecord(format!("bad timestamp {:?}: {}", trimmed, e)))
}
