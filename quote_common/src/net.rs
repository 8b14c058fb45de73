//! Shared networking constants and helpers used by the feed server and the pipeline.

/// TCP port the quote feed answers queries on.
pub const FEED_PORT: u16 = 8080;

/// Default address the streaming client queries when none is given.
pub const DEFAULT_FEED_HOST: &str = "127.0.0.1";

/// Helper to format an address with a port like "ip:port".
pub fn addr(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}
