//! Data source adapters.
//!
//! A `QuoteSource` hands out whatever new quotes are available each time it is pulled.
//! "Nothing new" is an empty vector; an error means the pull as a whole failed and no
//! partial data is returned.
//!
//! - `TcpFeedSource` — queries the quote feed over TCP, one connection per pull.
//! - `ScriptedSource` — replays pre-recorded batches (tests and offline runs).
use log::{debug, warn};
use quote_common::tickers::Ticker;
use quote_common::{Command, QuoteRecord, Result, StreamError};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::{BufRead, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default time allowed for connecting to and reading from the feed.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Pull-style access to an upstream quote feed.
pub trait QuoteSource: Send {
    /// Retrieves the quotes currently available.
    fn pull(&mut self) -> Result<Vec<QuoteRecord>>;
}

impl<S: QuoteSource + ?Sized> QuoteSource for Box<S> {
    fn pull(&mut self) -> Result<Vec<QuoteRecord>> {
        (**self).pull()
    }
}

/// Decodes a feed reply (a JSON array of quotes). A blank reply means no data.
///
/// Only a reply that is not a JSON array fails the pull. Each element is decoded on its
/// own; an element that is not a quote object becomes an empty record, which the
/// pipeline then drops and counts as malformed.
pub fn decode_batch(body: &[u8]) -> Result<Vec<QuoteRecord>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let elements: Vec<Value> = serde_json::from_slice(body)
        .map_err(|e| StreamError::Source(format!("bad feed reply: {}", e)))?;

    Ok(elements
        .into_iter()
        .map(|element| {
            serde_json::from_value(element).unwrap_or_else(|e| {
                warn!("Unreadable quote in feed reply: {}", e);
                QuoteRecord::default()
            })
        })
        .collect())
}

/// Queries the quote feed over TCP.
pub struct TcpFeedSource {
    addr: SocketAddr,
    query: Vec<u8>,
    timeout: Duration,
}

impl TcpFeedSource {
    /// Resolves `addr` once and prepares the query for `tickers` (empty = all).
    pub fn new(addr: &str, tickers: Vec<Ticker>) -> Result<Self> {
        let resolved = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| StreamError::Format(format!("cannot resolve feed address {}", addr)))?;
        Ok(Self {
            addr: resolved,
            query: Command::query(tickers).to_line()?,
            timeout: DEFAULT_IO_TIMEOUT,
        })
    }

    /// Overrides the connect/read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The resolved feed address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn fetch(&self) -> std::io::Result<Vec<u8>> {
        let mut stream = TcpStream::connect_timeout(&self.addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.write_all(&self.query)?;

        let mut body = Vec::new();
        stream.read_to_end(&mut body)?;
        Ok(body)
    }
}

impl QuoteSource for TcpFeedSource {
    fn pull(&mut self) -> Result<Vec<QuoteRecord>> {
        let body = self
            .fetch()
            .map_err(|e| StreamError::Source(format!("{}: {}", self.addr, e)))?;
        let records = decode_batch(&body)?;
        debug!("Pulled {} quote(s) from {}", records.len(), self.addr);
        Ok(records)
    }
}

/// Replays queued batches in order, then reports no new data.
#[derive(Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<Vec<QuoteRecord>>>,
}

impl ScriptedSource {
    /// Creates a source with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a batch.
    pub fn push_batch(mut self, batch: Vec<QuoteRecord>) -> Self {
        self.script.push_back(Ok(batch));
        self
    }

    /// Queues a failed pull.
    pub fn push_failure(mut self, reason: &str) -> Self {
        self.script
            .push_back(Err(StreamError::Source(String::from(reason))));
        self
    }

    /// Reads one JSON array of quotes per non-empty line.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut source = Self::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            source = source.push_batch(decode_batch(line.as_bytes())?);
        }
        Ok(source)
    }

    /// Batches and failures still queued.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl QuoteSource for ScriptedSource {
    fn pull(&mut self) -> Result<Vec<QuoteRecord>> {
        self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}
