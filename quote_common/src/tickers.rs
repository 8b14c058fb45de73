//! Ticker symbols and helpers shared between the feed and the pipeline.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use strum_macros::{Display, EnumString};

use crate::error::StreamError;

/// Trait providing file parsing for tickers.
pub trait TickerParser {
    /// Parses tickers from a buffered reader.
    ///
    /// Each non-empty line may hold one or more symbols separated by commas or spaces.
    /// Returns an error if any symbol cannot be parsed.
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Ticker>, StreamError>;
}

impl TickerParser for Ticker {
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Self>, StreamError> {
        let mut tickers = Vec::new();

        for line_result in reader.lines() {
            let line = line_result.map_err(StreamError::Io)?;
            let symbols = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty());

            for symbol in symbols {
                match symbol.parse::<Self>() {
                    Ok(ticker) if !tickers.contains(&ticker) => tickers.push(ticker),
                    Ok(_) => {}
                    Err(e) => {
                        return Err(StreamError::ParseTickersFile(format!("{}: {}", symbol, e)));
                    }
                }
            }
        }
        Ok(tickers)
    }
}

/// Set of symbols the feed publishes.
#[allow(missing_docs)]
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    ValueEnum,
    Display,
    EnumString,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
)]
#[clap(rename_all = "lower")]
#[strum(ascii_case_insensitive)]
pub enum Ticker {
    AAPL,
    MSFT,
    GOOGL,
    AMZN,
    NVDA,
    META,
    TSLA,
    JPM,
    NFLX,
    INTC,
    ORCL,
    IBM,
}

impl Ticker {
    /// Every supported symbol, in declaration order.
    pub const ALL: [Ticker; 12] = [
        Ticker::AAPL,
        Ticker::MSFT,
        Ticker::GOOGL,
        Ticker::AMZN,
        Ticker::NVDA,
        Ticker::META,
        Ticker::TSLA,
        Ticker::JPM,
        Ticker::NFLX,
        Ticker::INTC,
        Ticker::ORCL,
        Ticker::IBM,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_mixed_separators_and_skips_duplicates() {
        let input = Cursor::new("aapl, MSFT\n\n  tsla aapl\n");
        let tickers = Ticker::parse_from_file(input).unwrap();
        assert_eq!(tickers, vec![Ticker::AAPL, Ticker::MSFT, Ticker::TSLA]);
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let input = Cursor::new("AAPL\nNOPE\n");
        let err = Ticker::parse_from_file(input).unwrap_err();
        assert!(matches!(err, StreamError::ParseTickersFile(ref msg) if msg.starts_with("NOPE")));
    }
}
