//! Data-feed capability boundary.
//!
//! This module defines only the trait and its error type; concrete
//! vendor transports live behind it and are out of scope — the replay
//! feed in this crate is the one shipped implementation.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rgk_schemas::bar::BarIntegrityError;
use rgk_schemas::Bar;

#[derive(Debug)]
pub enum FeedError {
    /// Operation attempted before `connect` succeeded.
    NotConnected,
    /// Symbol was never subscribed.
    NotSubscribed { symbol: String },
    /// Network or transport failure.
    Transport(String),
    /// A payload could not be decoded into a bar.
    Decode(String),
    /// The feed delivered a corrupted bar. Fatal to the loop.
    Integrity(BarIntegrityError),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::NotConnected => write!(f, "feed not connected"),
            FeedError::NotSubscribed { symbol } => {
                write!(f, "symbol not subscribed: {symbol}")
            }
            FeedError::Transport(msg) => write!(f, "feed transport error: {msg}"),
            FeedError::Decode(msg) => write!(f, "feed decode error: {msg}"),
            FeedError::Integrity(e) => write!(f, "feed integrity error: {e}"),
        }
    }
}

impl std::error::Error for FeedError {}

/// Market-data feed contract.
///
/// Implementations must be object-safe (`Box<dyn DataFeed>`) and
/// `Send` so the scheduler task can own one. Entry points block; the
/// scheduler is the only caller and awaits nothing here. A `None` from
/// [`DataFeed::next_bar`] is a timeout, not an error — the loop simply
/// moves to the next symbol.
pub trait DataFeed: Send {
    fn name(&self) -> &'static str;

    fn connect(&mut self) -> Result<(), FeedError>;

    /// Subscribe to `symbols`; the feed must deliver `preload_bars`
    /// historical bars per symbol as the first items.
    fn subscribe(&mut self, symbols: &[String], preload_bars: usize) -> Result<(), FeedError>;

    /// Next bar for `symbol`, waiting at most `timeout`.
    fn next_bar(&mut self, symbol: &str, timeout: Duration) -> Result<Option<Bar>, FeedError>;

    /// Ordered historical bars for a range.
    fn historical_bars(
        &mut self,
        symbol: &str,
        timeframe_secs: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, FeedError>;

    fn close(&mut self);
}
