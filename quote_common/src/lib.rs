//!
//! Common types and utilities shared by the quote feed and the streaming pipeline.
//!
//! This crate aggregates:
//! - `error` — unified error type `StreamError` used across the workspace.
//! - `result` — handy `Result<T, StreamError>` alias.
//! - `quote` — the `QuoteRecord` wire model and timestamp helpers.
//! - `tickers` — ticker symbols and parsing helpers shared by both sides.
//! - `command` — the query command sent to the feed.
//! - `net` — networking constants and small helpers.
#![warn(missing_docs)]
pub mod command;
pub mod error;
pub mod net;
pub mod quote;
pub mod result;
pub mod tickers;

pub use command::Command;
pub use error::StreamError;
pub use quote::{QuoteRecord, QuoteSide};
pub use result::Result;
