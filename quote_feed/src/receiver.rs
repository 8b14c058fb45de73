use log::{debug, error, warn};
use quote_common::Result;
use quote_common::command::Command;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::generator::QuoteBook;

/// How long a client may take to send its query line.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// TCP query receiver.
///
/// Each connection carries one `QUERY` command line. The reply is a JSON array with the
/// latest quote per requested ticker, after which the connection is closed. Every
/// connection is answered on its own thread, so a slow or bad client only affects
/// itself.
pub struct QueryReceiver {
    /// The underlying TCP listening socket.
    pub(crate) socket: TcpListener,
}

impl QueryReceiver {
    /// Bind a new TCP receiver to the provided `bind_addr` (e.g., `0.0.0.0:8080`).
    pub fn new(bind_addr: &str) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self { socket })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Blocking loop answering queries from `book`.
    pub fn serve(self, book: Arc<Mutex<QuoteBook>>) -> Result<()> {
        for stream in self.socket.incoming() {
            match stream {
                Ok(stream) => {
                    let peer = stream
                        .peer_addr()
                        .map(|addr| addr.to_string())
                        .unwrap_or_else(|_| String::from("unknown"));
                    let book = Arc::clone(&book);
                    thread::spawn(move || {
                        if let Err(e) = answer_query(stream, &book) {
                            warn!("Query from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => error!("TCP connection error: {}", e),
            }
        }
        Ok(())
    }
}

/// Reads one command from `stream` and writes the matching quotes back.
pub(crate) fn answer_query(stream: TcpStream, book: &Mutex<QuoteBook>) -> Result<usize> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;

    let command = Command::from_line(&line)?;
    let quotes = book.lock()?.snapshot(&command.tickers);
    let reply = serde_json::to_vec(&quotes)?;

    let stream = reader.get_mut();
    stream.write_all(&reply)?;
    stream.flush()?;
    debug!("Answered {:?} with {} quote(s)", command.tickers, quotes.len());
    Ok(quotes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use quote_common::QuoteRecord;
    use quote_common::tickers::Ticker;
    use std::io::Read;
    use std::time::Instant;

    fn book() -> Arc<Mutex<QuoteBook>> {
        let mut book = QuoteBook::new();
        for (i, ticker) in [Ticker::AAPL, Ticker::MSFT, Ticker::IBM].into_iter().enumerate() {
            let at = DateTime::from_timestamp(i as i64, 0).unwrap().naive_utc();
            book.update(ticker, QuoteRecord::new(&ticker.to_string(), at).with_ask(10.0, 1));
        }
        Arc::new(Mutex::new(book))
    }

    fn ask(addr: std::net::SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(request).unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).unwrap();
        reply
    }

    #[test]
    fn answers_queries_and_survives_bad_ones() {
        let receiver = QueryReceiver::new("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr().unwrap();
        let shared = book();
        thread::spawn(move || receiver.serve(shared));

        assert_eq!(ask(addr, b"not json\n"), "");

        let query = Command::query(vec![Ticker::IBM, Ticker::AAPL]).to_line().unwrap();
        let reply: Vec<QuoteRecord> = serde_json::from_str(&ask(addr, &query)).unwrap();
        let stocks: Vec<&str> = reply.iter().map(|q| q.stock.as_str()).collect();
        assert_eq!(stocks, vec!["AAPL", "IBM"]);

        let everything = Command::query(Vec::new()).to_line().unwrap();
        let reply: Vec<QuoteRecord> = serde_json::from_str(&ask(addr, &everything)).unwrap();
        assert_eq!(reply.len(), 3);
    }

    #[test]
    fn silent_client_does_not_hold_up_others() {
        let receiver = QueryReceiver::new("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr().unwrap();
        let shared = book();
        thread::spawn(move || receiver.serve(shared));

        let _silent = TcpStream::connect(addr).unwrap();
        let started = Instant::now();
        let query = Command::query(vec![Ticker::MSFT]).to_line().unwrap();
        let reply: Vec<QuoteRecord> = serde_json::from_str(&ask(addr, &query)).unwrap();

        assert_eq!(reply.len(), 1);
        assert!(started.elapsed() < READ_TIMEOUT / 2);
    }
}
