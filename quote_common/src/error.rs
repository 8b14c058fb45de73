//! Error types shared between the feed server and the streaming pipeline.
//!
//! The `StreamError` enum unifies I/O, serialization and locking failures with
//! the three pipeline failure classes: a pull that could not retrieve data, a record that
//! is missing a required field, and a sink that rejected a delivery.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type shared by every crate in the workspace.
#[derive(Error, Debug)]
pub enum StreamError {
    /// I/O error originating from the standard library or sockets/files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Error while parsing the ticker file into `Ticker` values.
    #[error("Parse tickers file error: {0}")]
    ParseTickersFile(String),

    /// The data source could not produce a batch for this pull.
    #[error("Source failure: {0}")]
    Source(String),

    /// A quote record is missing a required field or carries an unreadable value.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// The downstream sink rejected or failed an update.
    #[error("Sink failure: {0}")]
    Sink(String),

    /// `start_streaming` was called on a pipeline that is already polling.
    #[error("Pipeline is already streaming")]
    AlreadyStreaming,

    /// Error indicating a poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),
}

impl StreamError {
    /// Returns `true` for errors that only invalidate a single record.
    pub fn is_record_level(&self) -> bool {
        matches!(self, StreamError::MalformedRecord(_))
    }
}

impl<T> From<PoisonError<T>> for StreamError {
    fn from(err: PoisonError<T>) -> Self {
        StreamError::MutexLock(err.to_string())
    }
}
