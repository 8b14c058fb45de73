//! Query command sent from the streaming pipeline to the quote feed.
//!
//! A `Command` is written as a single JSON line. The feed answers a `QUERY` with a JSON
//! array holding the latest quote for each requested ticker and then closes the
//! connection.
use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::tickers::Ticker;

/// Header value for quote queries.
pub const QUERY: &str = "QUERY";

/// Command payload sent to the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command kind. Currently always `QUERY`.
    pub header: String,
    /// Tickers to report. Empty means every ticker the feed publishes.
    #[serde(default)]
    pub tickers: Vec<Ticker>,
}

impl Command {
    /// Creates a new `QUERY` command.
    pub fn query(tickers: Vec<Ticker>) -> Self {
        Command {
            header: String::from(QUERY),
            tickers,
        }
    }

    /// Encodes the command as a newline-terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>, StreamError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Decodes a command from one JSON line, rejecting unknown headers.
    pub fn from_line(line: &str) -> Result<Self, StreamError> {
        let command: Command = serde_json::from_str(line.trim())?;
        if command.header != QUERY {
            return Err(StreamError::Format(format!(
                "unknown command header: {}",
                command.header
            )));
        }
        Ok(command)
    }
}
